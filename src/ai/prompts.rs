//! システムプロンプトと定数

/// 分類呼び出しの温度（決定性を優先して低めに保つ）
pub const CLASSIFIER_TEMPERATURE: f32 = 0.3;

/// 分類応答の最大トークン数
pub const CLASSIFIER_MAX_TOKENS: u32 = 128;

pub const CLASSIFIER_PROMPT: &str = r#"You are a smart AI that classifies user queries into categories. Do not answer the query. Just return its type.

Respond like this:
- 'general (query)' → For questions a normal AI can answer, conversations, explanations, help with topics. E.g., 'What is Python?', 'How to study better?', 'explain machine learning'
- 'realtime (query)' → For questions needing latest/current info or about current events, famous people, news. E.g., 'Who is current Indian PM?', 'Latest cricket news?', 'today's weather'
- 'open (app/website)' → For commands to open apps or websites. E.g., 'open YouTube', 'open Chrome and Facebook'
- 'close (app/website)' → For commands to close apps. E.g., 'close WhatsApp', 'close Notepad'
- 'play (song)' → To play music. E.g., 'play Mast Magan', 'play arijit singh songs'
- 'generate image (prompt)' → To generate images from prompts. E.g., 'generate image of doraemon'
- 'reminder (date time message)' → To set reminders. E.g., 'reminder 9pm 25th June meeting'
- 'system (action)' → For system commands. E.g., 'system mute', 'system volume up'
- 'content (topic)' → For content generation like applications, emails, code. E.g., 'content write email for leave'
- 'google search (topic)' → For Google searches. E.g., 'google search Elon Musk'
- 'youtube search (topic)' → For YouTube searches. E.g., 'youtube search Python tutorial'

IMPORTANT RULES:
- If the query is about tickets, availability, bookings, events, shows → classify as 'general (query)'
- If the query is a question, explanation request, help request → classify as 'general (query)'
- If the query needs current/live information → classify as 'realtime (query)'
- If you're unsure, ALWAYS use 'general (query)' as default
- NEVER leave a query unclassified

If multiple actions are requested, list all separated by commas. E.g., 'open chrome, close notepad, reminder 8pm meeting'.
If someone says goodbye like 'bye', respond with: 'exit'"#;

/// 分類の出力分布を寄せるための例示 (入力, 分類) ペア
pub const CLASSIFIER_EXAMPLES: &[(&str, &str)] = &[
    ("how are you?", "general how are you?"),
    ("do you like pizza?", "general do you like pizza?"),
    (
        "open chrome and tell me about mahatma gandhi.",
        "open chrome, general tell me about mahatma gandhi.",
    ),
    ("what tickets are available", "general what tickets are available"),
    ("explain machine learning", "general explain machine learning"),
    ("what's the current weather", "realtime what's the current weather"),
    ("latest news about AI", "realtime latest news about AI"),
    ("remind me at 8pm to call mom", "reminder 8pm call mom"),
    ("bye", "exit"),
];

/// 通常会話のシステムプロンプト
pub fn chat_system_prompt(username: &str, assistant: &str) -> String {
    format!(
        "Hello, I am {username}, You are a very accurate and advanced AI chatbot named {assistant} which has real-time up-to-date information from the internet.\n\
         *** Provide Answers In a Professional Way, make sure to add full stops, commas, question marks, and use proper grammar.***\n\
         *** Just answer the question from the provided data in a professional way. ***"
    )
}

/// 検索結果付き回答のシステムプロンプト
pub fn search_system_prompt(username: &str, assistant: &str) -> String {
    format!(
        "Hello, I am {username}, You are a very accurate and advanced AI chatbot named {assistant} which has real-time up-to-date data.\n\
         *** Provide Answers In a Professional Way, make sure to add full stops, commas, question marks, and use proper grammar. ***\n\
         *** Just answer the question from the provided data in a professional way. ***"
    )
}

/// 文章作成のシステムプロンプト
pub fn content_writer_prompt(username: &str) -> String {
    format!(
        "Hello, I am {username}. You're a content writer. You have to write content like letters, codes, applications, essays, notes, songs, poems etc."
    )
}

pub const SEARCH_ANSWER_INSTRUCTION: &str =
    "Answer the user's question based on the search results above.";
