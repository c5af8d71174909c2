//! Language policy: speaker selection, switch-request detection, script-based
//! language detection, and the greeting/farewell/silence-prompt/fallback text
//! bank.
//!
//! Grounded on `examples/original_source/backend/websocket_handler.py`'s
//! `_get_speaker_for_language` / `_send_initial_greeting` /
//! `_send_silence_warning` / `_end_call_gracefully` /
//! `_send_language_switch_confirmation`. English and Hindi text is drawn
//! verbatim from there; the remaining supported tags carry parallel literal
//! text (SPEC_FULL.md Open Question 3).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// The eleven Sarvam-supported Indian language tags.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "en-IN", "hi-IN", "bn-IN", "gu-IN", "kn-IN", "ml-IN", "mr-IN", "or-IN", "pa-IN", "ta-IN",
    "te-IN",
];

/// Default speaker across every supported language.
pub const DEFAULT_SPEAKER: &str = "meera";

/// Returns the TTS speaker tag for a language (defaults to `meera`).
pub fn speaker_for(_lang: &str) -> &'static str {
    DEFAULT_SPEAKER
}

struct LangText {
    greeting: &'static str,
    farewell: &'static str,
    silence_prompt_1: &'static str,
    silence_prompt_2: &'static str,
    switch_confirmation: &'static str,
    fallbacks: &'static [&'static str],
}

static TEXT_BANK: Lazy<HashMap<&'static str, LangText>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "en-IN",
        LangText {
            greeting: "Hello! I am here to help you. Please tell me how I can assist you?",
            farewell: "Thank you for calling. Have a good day. Goodbye!",
            silence_prompt_1: "Are you there? Please go ahead and speak.",
            silence_prompt_2: "I'm still here whenever you're ready. Is there anything else?",
            switch_confirmation: "I will now speak in English. How can I help you?",
            fallbacks: &[
                "I'm sorry, could you say that again?",
                "I didn't quite catch that — please continue.",
                "Let's continue, please go ahead.",
            ],
        },
    );
    m.insert(
        "hi-IN",
        LangText {
            greeting: "नमस्ते! मैं आपकी सहायता के लिए यहाँ हूँ। कृपया बताएं कि मैं आपकी कैसे मदद कर सकती हूँ?",
            farewell: "धन्यवाद आपने कॉल किया। आपका दिन शुभ हो। नमस्ते!",
            silence_prompt_1: "क्या आप वहाँ हैं? कृपया बोलें।",
            silence_prompt_2: "मैं आपका इंतज़ार कर रहा हूँ। कुछ और कहना चाहते हैं?",
            switch_confirmation: "मैं अब हिंदी में बोलूंगी। मैं आपकी कैसे मदद कर सकती हूं?",
            fallbacks: &["कृपया दोबारा कहें।", "कृपया जारी रखें।"],
        },
    );
    m.insert(
        "bn-IN",
        LangText {
            greeting: "নমস্কার! আমি আপনাকে সাহায্য করতে এখানে আছি। অনুগ্রহ করে বলুন আমি কীভাবে সাহায্য করতে পারি?",
            farewell: "কল করার জন্য ধন্যবাদ। আপনার দিন শুভ হোক। বিদায়!",
            silence_prompt_1: "আপনি কি সেখানে আছেন? অনুগ্রহ করে বলুন।",
            silence_prompt_2: "আমি আপনার জন্য অপেক্ষা করছি। আর কিছু বলতে চান?",
            switch_confirmation: "আমি এখন বাংলায় কথা বলব। আমি আপনাকে কিভাবে সাহায্য করতে পারি?",
            fallbacks: &["দয়া করে আবার বলুন।", "দয়া করে চালিয়ে যান।"],
        },
    );
    m.insert(
        "gu-IN",
        LangText {
            greeting: "નમસ્તે! હું તમારી મદદ માટે અહીં છું. કૃપા કરીને જણાવો હું કેવી રીતે મદદ કરી શકું?",
            farewell: "કૉલ કરવા બદલ આભાર. તમારો દિવસ શુભ રહે. આવજો!",
            silence_prompt_1: "શું તમે ત્યાં છો? કૃપા કરીને બોલો.",
            silence_prompt_2: "હું તમારી રાહ જોઈ રહ્યો છું. બીજું કંઈ કહેવું છે?",
            switch_confirmation: "હું હવે ગુજરાતીમાં બોલીશ. હું તમારી કેવી રીતે મદદ કરી શકું?",
            fallbacks: &["કૃપા કરીને ફરીથી કહો.", "કૃપા કરીને ચાલુ રાખો."],
        },
    );
    m.insert(
        "kn-IN",
        LangText {
            greeting: "ನಮಸ್ಕಾರ! ನಾನು ನಿಮಗೆ ಸಹಾಯ ಮಾಡಲು ಇಲ್ಲಿದ್ದೇನೆ. ದಯವಿಟ್ಟು ಹೇಳಿ ನಾನು ಹೇಗೆ ಸಹಾಯ ಮಾಡಬಹುದು?",
            farewell: "ಕರೆ ಮಾಡಿದ್ದಕ್ಕಾಗಿ ಧನ್ಯವಾದಗಳು. ನಿಮ್ಮ ದಿನ ಶುಭವಾಗಲಿ. ವಿದಾಯ!",
            silence_prompt_1: "ನೀವು ಅಲ್ಲಿದ್ದೀರಾ? ದಯವಿಟ್ಟು ಮಾತನಾಡಿ.",
            silence_prompt_2: "ನಾನು ನಿಮಗಾಗಿ ಕಾಯುತ್ತಿದ್ದೇನೆ. ಬೇರೆ ಏನಾದರೂ ಹೇಳಬೇಕೇ?",
            switch_confirmation: "ನಾನು ಈಗ ಕನ್ನಡದಲ್ಲಿ ಮಾತನಾಡುತ್ತೇನೆ. ನಾನು ನಿಮಗೆ ಹೇಗೆ ಸಹಾಯ ಮಾಡಬಹುದು?",
            fallbacks: &["ದಯವಿಟ್ಟು ಮತ್ತೆ ಹೇಳಿ.", "ದಯವಿಟ್ಟು ಮುಂದುವರಿಸಿ."],
        },
    );
    m.insert(
        "ml-IN",
        LangText {
            greeting: "നമസ്കാരം! ഞാൻ നിങ്ങളെ സഹായിക്കാൻ ഇവിടെയുണ്ട്. ഞാൻ എങ്ങനെ സഹായിക്കണമെന്ന് പറയൂ?",
            farewell: "വിളിച്ചതിന് നന്ദി. നല്ലൊരു ദിവസം ആശംസിക്കുന്നു. വിട!",
            silence_prompt_1: "നിങ്ങൾ അവിടെയുണ്ടോ? ദയവായി സംസാരിക്കൂ.",
            silence_prompt_2: "ഞാൻ നിങ്ങൾക്കായി കാത്തിരിക്കുന്നു. മറ്റെന്തെങ്കിലും പറയണോ?",
            switch_confirmation: "ഞാൻ ഇപ്പോൾ മലയാളത്തിൽ സംസാരിക്കും. ഞാൻ നിങ്ങളെ എങ്ങനെ സഹായിക്കും?",
            fallbacks: &["ദയവായി വീണ്ടും പറയൂ.", "ദയവായി തുടരൂ."],
        },
    );
    m.insert(
        "mr-IN",
        LangText {
            greeting: "नमस्कार! मी तुमच्या मदतीसाठी येथे आहे. कृपया सांगा मी तुमची कशी मदत करू शकतो?",
            farewell: "कॉल केल्याबद्दल धन्यवाद. तुमचा दिवस शुभ जावो. निरोप!",
            silence_prompt_1: "तुम्ही तिथे आहात का? कृपया बोला.",
            silence_prompt_2: "मी तुमची वाट पाहत आहे. आणखी काही सांगायचे आहे का?",
            switch_confirmation: "मी आता मराठीत बोलेन. मी तुम्हाला कशी मदत करू शकते?",
            fallbacks: &["कृपया पुन्हा सांगा.", "कृपया सुरू ठेवा."],
        },
    );
    m.insert(
        "or-IN",
        LangText {
            greeting: "ନମସ୍କାର! ମୁଁ ଆପଣଙ୍କୁ ସାହାଯ୍ୟ କରିବାକୁ ଏଠାରେ ଅଛି। ଦୟାକରି କୁହନ୍ତୁ ମୁଁ କିପରି ସାହାଯ୍ୟ କରିପାରିବି?",
            farewell: "କଲ୍ କରିଥିବାରୁ ଧନ୍ୟବାଦ। ଆପଣଙ୍କ ଦିନ ଶୁଭ ହେଉ। ବିଦାୟ!",
            silence_prompt_1: "ଆପଣ ସେଠାରେ ଅଛନ୍ତି କି? ଦୟାକରି କୁହନ୍ତୁ।",
            silence_prompt_2: "ମୁଁ ଆପଣଙ୍କ ପାଇଁ ଅପେକ୍ଷା କରୁଛି। ଆଉ କିଛି କହିବାକୁ ଅଛି କି?",
            switch_confirmation: "ମୁଁ ବର୍ତ୍ତମାନ ଓଡ଼ିଆରେ କହିବି। ମୁଁ ଆପଣଙ୍କୁ କିପରି ସାହାଯ୍ୟ କରିପାରିବି?",
            fallbacks: &["ଦୟାକରି ପୁଣି କୁହନ୍ତୁ।", "ଦୟାକରି ଜାରି ରଖନ୍ତୁ।"],
        },
    );
    m.insert(
        "pa-IN",
        LangText {
            greeting: "ਸਤ ਸ੍ਰੀ ਅਕਾਲ! ਮੈਂ ਤੁਹਾਡੀ ਮਦਦ ਲਈ ਇੱਥੇ ਹਾਂ। ਕਿਰਪਾ ਕਰਕੇ ਦੱਸੋ ਮੈਂ ਤੁਹਾਡੀ ਕਿਵੇਂ ਮਦਦ ਕਰ ਸਕਦੀ ਹਾਂ?",
            farewell: "ਕਾਲ ਕਰਨ ਲਈ ਧੰਨਵਾਦ। ਤੁਹਾਡਾ ਦਿਨ ਸ਼ੁਭ ਹੋਵੇ। ਅਲਵਿਦਾ!",
            silence_prompt_1: "ਕੀ ਤੁਸੀਂ ਉੱਥੇ ਹੋ? ਕਿਰਪਾ ਕਰਕੇ ਬੋਲੋ।",
            silence_prompt_2: "ਮੈਂ ਤੁਹਾਡੀ ਉਡੀਕ ਕਰ ਰਿਹਾ ਹਾਂ। ਕੁਝ ਹੋਰ ਕਹਿਣਾ ਹੈ?",
            switch_confirmation: "ਮੈਂ ਹੁਣ ਪੰਜਾਬੀ ਵਿੱਚ ਬੋਲਾਂਗੀ। ਮੈਂ ਤੁਹਾਡੀ ਕਿਵੇਂ ਮਦਦ ਕਰ ਸਕਦੀ ਹਾਂ?",
            fallbacks: &["ਕਿਰਪਾ ਕਰਕੇ ਦੁਬਾਰਾ ਕਹੋ।", "ਕਿਰਪਾ ਕਰਕੇ ਜਾਰੀ ਰੱਖੋ।"],
        },
    );
    m.insert(
        "ta-IN",
        LangText {
            greeting: "வணக்கம்! நான் உங்களுக்கு உதவ இங்கே இருக்கிறேன். நான் எப்படி உதவ முடியும் என்று சொல்லுங்கள்?",
            farewell: "அழைத்ததற்கு நன்றி. உங்கள் நாள் இனிதாக அமையட்டும். விடைபெறுகிறேன்!",
            silence_prompt_1: "நீங்கள் அங்கே இருக்கிறீர்களா? தயவுசெய்து பேசுங்கள்.",
            silence_prompt_2: "நான் உங்களுக்காக காத்திருக்கிறேன். வேறு ஏதாவது சொல்ல வேண்டுமா?",
            switch_confirmation: "நான் இப்போது தமிழில் பேசுவேன். நான் உங்களுக்கு எப்படி உதவ முடியும்?",
            fallbacks: &["தயவுசெய்து மீண்டும் சொல்லுங்கள்.", "தயவுசெய்து தொடருங்கள்."],
        },
    );
    m.insert(
        "te-IN",
        LangText {
            greeting: "నమస్కారం! నేను మీకు సహాయం చేయడానికి ఇక్కడ ఉన్నాను. నేను ఎలా సహాయం చేయగలనో చెప్పండి?",
            farewell: "కాల్ చేసినందుకు ధన్యవాదాలు. మీ రోజు శుభంగా ఉండాలి. వీడ్కోలు!",
            silence_prompt_1: "మీరు అక్కడ ఉన్నారా? దయచేసి మాట్లాడండి.",
            silence_prompt_2: "నేను మీ కోసం వేచి ఉన్నాను. మరేదైనా చెప్పాలనుకుంటున్నారా?",
            switch_confirmation: "నేను ఇప్పుడు తెలుగులో మాట్లాడతాను. నేను మీకు ఎలా సహాయం చేయగలను?",
            fallbacks: &["దయచేసి మళ్ళీ చెప్పండి.", "దయచేసి కొనసాగించండి."],
        },
    );
    m
});

fn text_for(lang: &str) -> &'static LangText {
    TEXT_BANK.get(lang).unwrap_or_else(|| TEXT_BANK.get("en-IN").unwrap())
}

pub fn greeting_for(lang: &str) -> &'static str {
    text_for(lang).greeting
}

pub fn farewell_for(lang: &str) -> &'static str {
    text_for(lang).farewell
}

/// `warning_index` is 1 for the first warning, 2 for the second and later.
pub fn silence_prompt(lang: &str, warning_index: u32) -> &'static str {
    let text = text_for(lang);
    if warning_index <= 1 {
        text.silence_prompt_1
    } else {
        text.silence_prompt_2
    }
}

pub fn switch_confirmation_for(lang: &str) -> &'static str {
    text_for(lang).switch_confirmation
}

pub fn fallback_replies(lang: &str) -> &'static [&'static str] {
    text_for(lang).fallbacks
}

struct SwitchPhrase {
    lang: &'static str,
    regex: Regex,
}

static SWITCH_PHRASES: Lazy<Vec<SwitchPhrase>> = Lazy::new(|| {
    let table: &[(&str, &[&str])] = &[
        ("en-IN", &["speak in english", "switch to english", "english please"]),
        ("hi-IN", &["speak in hindi", "switch to hindi", "hindi mein baat", "hindi please"]),
        ("bn-IN", &["speak in bengali", "switch to bengali", "bengali please"]),
        ("gu-IN", &["speak in gujarati", "switch to gujarati"]),
        ("kn-IN", &["speak in kannada", "switch to kannada"]),
        ("ml-IN", &["speak in malayalam", "switch to malayalam"]),
        ("mr-IN", &["speak in marathi", "switch to marathi"]),
        ("or-IN", &["speak in odia", "switch to odia", "speak in oriya"]),
        ("pa-IN", &["speak in punjabi", "switch to punjabi"]),
        ("ta-IN", &["speak in tamil", "switch to tamil"]),
        ("te-IN", &["speak in telugu", "switch to telugu"]),
    ];

    table
        .iter()
        .flat_map(|(lang, phrases)| {
            phrases.iter().map(move |p| SwitchPhrase {
                lang,
                regex: Regex::new(&regex::escape(p)).expect("static phrase is a valid pattern"),
            })
        })
        .collect()
});

/// Detects an explicit language-switch request in user text
/// (case-insensitive phrase match).
pub fn detect_switch_request(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    SWITCH_PHRASES
        .iter()
        .find(|p| p.regex.is_match(&lowered))
        .map(|p| p.lang)
}

/// Script-based heuristic language detection. Returns `None` when no script
/// signal is present (e.g. plain digits or punctuation only).
pub fn detect_language_from_text(text: &str) -> Option<&'static str> {
    if text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c)) {
        return Some("hi-IN");
    }
    if text.chars().any(|c| ('\u{0B80}'..='\u{0BFF}').contains(&c)) {
        return Some("ta-IN");
    }
    if text.chars().any(|c| ('\u{0980}'..='\u{09FF}').contains(&c)) {
        return Some("bn-IN");
    }
    if text.chars().any(|c| ('\u{0A80}'..='\u{0AFF}').contains(&c)) {
        return Some("gu-IN");
    }
    if text.chars().any(|c| ('\u{0C80}'..='\u{0CFF}').contains(&c)) {
        return Some("kn-IN");
    }
    if text.chars().any(|c| ('\u{0D00}'..='\u{0D7F}').contains(&c)) {
        return Some("ml-IN");
    }
    if text.chars().any(|c| ('\u{0B00}'..='\u{0B7F}').contains(&c)) {
        return Some("or-IN");
    }
    if text.chars().any(|c| ('\u{0A00}'..='\u{0A7F}').contains(&c)) {
        return Some("pa-IN");
    }
    if text.chars().any(|c| ('\u{0C00}'..='\u{0C7F}').contains(&c)) {
        return Some("te-IN");
    }

    let lowered = text.to_lowercase();
    const EN_MARKERS: &[&str] = &["please", "thanks", "hello", "okay", "the "];
    if text.is_ascii() && EN_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Some("en-IN");
    }

    None
}
