//! REVINDEX - Multi-Version Revision Index
//! Interactive shell over a revision store: write keys, read them
//! back as of any retained revision, and compact history.

use std::io::{self, BufRead, Write};

use revindex::config::Config;
use revindex::engine::RevStore;
use revindex::error::RevIndexError;

fn parse_rev(arg: Option<&&str>) -> Result<Option<i64>, String> {
    match arg {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("invalid revision '{}'", raw)),
    }
}

fn main() {
    env_logger::init();

    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║             REVINDEX Store                ║");
    println!("  ║    Multi-Version Revision Index v1.0.0    ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Commands:");
    println!("    put <key>                  - Write a new revision of a key");
    println!("    del <key>                  - Delete a key");
    println!("    get <key> [rev]            - Show a key as of a revision");
    println!("    range <start> <end> [rev]  - List keys in [start, end)");
    println!("    compact <rev>              - Discard history below a revision");
    println!("    info                       - Show store statistics");
    println!("    exit                       - Shutdown store");
    println!();

    let config = Config::default();
    let mut store = match RevStore::open(config) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("[ERROR] Failed to open store: {}", err);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("revindex> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break, // EOF
            Ok(_) => {}
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0].to_lowercase().as_str() {
            "put" | "set" => {
                if parts.len() < 2 {
                    println!("  Usage: put <key>");
                    continue;
                }
                match store.put(parts[1].as_bytes().to_vec()) {
                    Ok(rev) => println!("  OK (revision {})", rev),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "del" | "delete" => {
                if parts.len() < 2 {
                    println!("  Usage: del <key>");
                    continue;
                }
                match store.delete(parts[1].as_bytes().to_vec()) {
                    Ok(rev) => println!("  OK (deleted at {})", rev),
                    Err(RevIndexError::RevisionNotFound) => println!("  (nil)"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "get" => {
                if parts.len() < 2 {
                    println!("  Usage: get <key> [rev]");
                    continue;
                }
                let at = match parse_rev(parts.get(2)) {
                    Ok(at) => at,
                    Err(msg) => {
                        println!("  ERROR: {}", msg);
                        continue;
                    }
                };
                match store.get(parts[1].as_bytes(), at) {
                    Ok(info) => println!(
                        "  modified {}  created {}  version {}",
                        info.modified, info.created, info.version
                    ),
                    Err(RevIndexError::RevisionNotFound) => println!("  (nil)"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "range" | "scan" => {
                if parts.len() < 3 {
                    println!("  Usage: range <start> <end> [rev]");
                    continue;
                }
                let at = match parse_rev(parts.get(3)) {
                    Ok(at) => at,
                    Err(msg) => {
                        println!("  ERROR: {}", msg);
                        continue;
                    }
                };
                match store.range(parts[1].as_bytes(), Some(parts[2].as_bytes()), at) {
                    Ok(entries) if entries.is_empty() => println!("  (empty)"),
                    Ok(entries) => {
                        for (key, rev) in &entries {
                            println!("  {} @ {}", String::from_utf8_lossy(key), rev);
                        }
                        println!("  ({} keys)", entries.len());
                    }
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "compact" => {
                let rev = match parts.get(1).map(|raw| raw.parse::<i64>()) {
                    Some(Ok(rev)) => rev,
                    _ => {
                        println!("  Usage: compact <rev>");
                        continue;
                    }
                };
                match store.compact(rev) {
                    Ok(removed) => println!("  OK ({} revisions reclaimed)", removed.len()),
                    Err(e @ RevIndexError::CompactionInvariant(_)) => {
                        eprintln!("[FATAL] {}", e);
                        std::process::exit(1);
                    }
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "info" | "stats" => {
                println!("  Keys:               {}", store.len());
                println!("  Current revision:   {}", store.current_revision());
                println!("  Compacted revision: {}", store.compacted_revision());
                println!("{}", store.index().metrics().report());
            }
            "exit" | "quit" | "q" => {
                println!("  Shutting down REVINDEX...");
                break;
            }
            _ => {
                println!("  Unknown command: '{}'. Type 'exit' to quit.", parts[0]);
            }
        }

        match store.maybe_compact() {
            Ok(Some(removed)) => log::info!("retention compacted {} revisions", removed.len()),
            Ok(None) => {}
            Err(e @ RevIndexError::CompactionInvariant(_)) => {
                eprintln!("[FATAL] {}", e);
                std::process::exit(1);
            }
            Err(e) => log::error!("retention compaction failed: {}", e),
        }
    }
}
