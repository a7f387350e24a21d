use chrono::{Local, Timelike};
use rand::Rng;

use super::color::{bold_magenta, cyan, white, yellow};
use super::friday::friday_talk;

/// 時刻（時）に応じた挨拶を返す。
///  - 5〜11時:  "Good morning"
///  - 12〜17時: "Good afternoon"
///  - 18〜4時:  "Good evening"
fn greeting_for(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    }
}

fn time_greeting() -> &'static str {
    greeting_for(Local::now().hour())
}

/// 起動時の Welcome バナーを表示する。
pub fn print_welcome(username: &str, assistant: &str) {
    let version = env!("CARGO_PKG_VERSION");

    let art_lines: &[&str] = &[
        r#" _____ ____  ___ ____    _ __   __"#,
        r#"|  ___|  _ \|_ _|  _ \  / \\ \ / /"#,
        r#"| |_  | |_) || || | | |/ _ \\ V / "#,
        r#"|  _| |  _ < | || |_| / ___ \| |  "#,
        r#"|_|   |_| \_\___|____/_/   \_\_|  "#,
    ];

    let separator = "==================================";
    let version_line = format!(
        "  {}  ::  {} {}",
        bold_magenta("F.R.I.D.A.Y."),
        white("Assistant"),
        yellow(&format!("v{version}"))
    );

    println!();
    for line in art_lines {
        println!("{}", white(line));
    }
    println!("{}", cyan(separator));
    println!("{version_line}");
    println!("{}", cyan(separator));
    println!();
    friday_talk(&format!(
        "{}, {username}. {assistant} is online. How can I help?",
        time_greeting()
    ));
    println!();
}

/// 終了時の Farewell メッセージを表示する。
pub fn print_goodbye(username: &str) {
    let greeting = time_greeting();

    let messages = [
        format!("Goodbye, {username}. Talk soon."),
        format!("Signing off. {greeting}, {username}."),
        "I'll be here if you need me.".to_string(),
        format!("Until next time, {username}."),
    ];

    let idx = rand::rng().random_range(0..messages.len());

    println!();
    friday_talk(&messages[idx]);
    println!();
}
