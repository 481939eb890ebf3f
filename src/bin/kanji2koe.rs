//! kanji2koe — convert kanji/kana text to AquesTalk phoneme symbols.
//!
//! Processing is line by line: every input line produces one output line.
//!
//! ```text
//! kanji2koe --dic aq_dic < in.txt > out.koe
//! kanji2koe --dic aq_dic --lib lib64/libAqKanji2Koe.so --text "こんにちは"
//! kanji2koe --dic aq_dic --encoding sjis < in_sjis.txt
//! ```
//!
//! With `--encoding sjis` input lines are read as Shift-JIS bytes and the
//! phoneme output is written back as Shift-JIS, matching the vendor's
//! Kanji2KoeCmd sample.

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use aqkanji2koe::{Kanji2Koe, Kanji2KoeConfig, Kanji2KoeError, TextEncoding};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "kanji2koe", version, about = "Japanese text → AquesTalk phoneme symbols")]
struct Args {
    /// Dictionary directory (must contain aqdic.bin)
    #[arg(long, default_value = "aq_dic")]
    dic: PathBuf,

    /// Explicit AqKanji2Koe library file
    #[arg(long)]
    lib: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input encoding: utf-8 or sjis
    #[arg(long, default_value = "utf-8")]
    encoding: TextEncoding,

    /// Output buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Developer license key
    #[arg(long)]
    dev_key: Option<String>,

    /// Output romaji symbols (AquesTalk pico) instead of kana
    #[arg(long)]
    roman: bool,

    /// Convert this text instead of reading stdin
    #[arg(long)]
    text: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kanji2koe: {e:#}");
            // Surface the library's own error code, as Kanji2KoeCmd does.
            let code = e
                .downcast_ref::<Kanji2KoeError>()
                .and_then(Kanji2KoeError::code)
                .and_then(|c| u8::try_from(c).ok())
                .filter(|&c| c != 0)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Kanji2KoeConfig::from_json_file(path)?,
        None => Kanji2KoeConfig::default(),
    }
    .with_env_overrides();
    if let Some(lib) = &args.lib {
        config.library_path = Some(lib.clone());
    }
    if let Some(key) = &args.dev_key {
        config.developer_key = Some(key.clone());
    }
    if let Some(size) = args.buffer_size {
        config.buffer_size = size;
    }

    let mut conv = Kanji2Koe::open_with_config(&args.dic, &config)
        .with_context(|| format!("cannot open dictionary {}", args.dic.display()))?;

    conv.scope(|conv| -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();

        if let Some(text) = &args.text {
            let koe = convert_line(conv, args, &config, text)?;
            write_line(&mut out, &koe, args.encoding)?;
            return Ok(());
        }

        for line in io::stdin().lock().split(b'\n') {
            let line = line.context("failed to read stdin")?;
            let text = decode_line(&line, args.encoding);
            let koe = convert_line(conv, args, &config, text.trim_end_matches('\r'))?;
            write_line(&mut out, &koe, args.encoding)?;
        }
        Ok(())
    })
}

fn convert_line(
    conv: &Kanji2Koe,
    args: &Args,
    config: &Kanji2KoeConfig,
    text: &str,
) -> Result<String> {
    let koe = if args.roman {
        conv.convert_roman(text, args.encoding, config.buffer_size)
    } else {
        conv.convert_with(text, args.encoding, config.buffer_size)
    };
    koe.with_context(|| format!("conversion failed for {text:?}"))
}

fn decode_line(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::ShiftJis => encoding_rs::SHIFT_JIS.decode(bytes).0.into_owned(),
    }
}

fn write_line(out: &mut impl Write, koe: &str, encoding: TextEncoding) -> Result<()> {
    match encoding {
        TextEncoding::Utf8 => out.write_all(koe.as_bytes())?,
        TextEncoding::ShiftJis => out.write_all(&encoding_rs::SHIFT_JIS.encode(koe).0)?,
    }
    out.write_all(b"\n")?;
    Ok(())
}
