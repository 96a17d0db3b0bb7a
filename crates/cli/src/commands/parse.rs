use std::path::Path;
use std::process;

use grammar_conformance::{normalize, ParserLoader};

pub(crate) async fn cmd_parse(artifact: &Path, file: &Path, positions: bool, json: bool) {
    let source = match tokio::fs::read_to_string(file).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read '{}': {}", file.display(), e);
            process::exit(1);
        }
    };

    let loader = ParserLoader::new();
    let handle = match loader.create_parser(artifact).resolve().await {
        Ok(h) => h,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let node = match handle.parse(&source).await {
        Ok(n) => n,
        Err(e) => {
            eprintln!("error: parser failed on '{}': {}", file.display(), e);
            process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&node) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: could not serialize tree: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("{}", normalize(&node, positions).pretty());
    }
}
