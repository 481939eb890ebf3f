//! Basic AqKanji2Koe example — converts a few sentences to phoneme symbols.
//!
//! Usage:
//!   cargo run --example basic -- --dic /path/to/aq_dic
//!   cargo run --example basic -- --dic aq_dic --lib lib64/libAqKanji2Koe.so --text "こんにちは"
//!
//! Requirements:
//!   - the AqKanji2Koe shared library (found via --lib, AQKANJI2KOE_LIBRARY,
//!     or the default search locations)
//!   - a dictionary directory containing aqdic.bin

use aqkanji2koe::{Kanji2Koe, Kanji2KoeConfig};

fn main() -> anyhow::Result<()> {
    // ── Parse simple CLI arguments ───────────────────────────────────────────
    let mut args = std::env::args().skip(1).peekable();

    let mut dic = "aq_dic".to_string();
    let mut lib: Option<String> = None;
    let mut texts = vec![
        "こんにちは".to_string(),
        "ありがとう".to_string(),
        "ゆっくりしていってね".to_string(),
    ];

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dic"  => { if let Some(v) = args.next() { dic = v; } }
            "--lib"  => { if let Some(v) = args.next() { lib = Some(v); } }
            "--text" => { if let Some(v) = args.next() { texts = vec![v]; } }
            "--help" => {
                println!("Usage: basic [--dic DIR] [--lib FILE] [--text TEXT]");
                return Ok(());
            }
            _ => {}
        }
    }

    // ── Open converter ───────────────────────────────────────────────────────
    let mut config = Kanji2KoeConfig::default().with_env_overrides();
    if let Some(lib) = lib {
        config.library_path = Some(lib.into());
    }

    println!("Dictionary : {}", dic);
    let mut conv = Kanji2Koe::open_with_config(&dic, &config)?;
    println!("Library    : {}", conv.api().path().display());
    println!();

    // ── Convert (released when the scope ends) ───────────────────────────────
    conv.scope(|conv| -> anyhow::Result<()> {
        for text in &texts {
            let koe = conv.convert(text, "utf-8", 1024)?;
            println!("Text    : {}", text);
            println!("Phoneme : {}", koe);
            println!("{}", "-".repeat(30));
        }
        Ok(())
    })?;

    println!("Released   : {}", !conv.is_initialized());
    Ok(())
}
