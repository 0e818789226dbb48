use std::env;
use std::net::SocketAddr;

use engine_api::{serve, SessionManager};

fn print_usage() {
    println!("engine-cli <command>");
    println!("commands:");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:<PORT|3000>");
    println!("  demo [prompt]");
    println!("    runs a session offline and prints the turn payloads");
}

fn default_addr() -> String {
    let port = env::var("PORT")
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(3000);
    format!("127.0.0.1:{port}")
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let fallback = default_addr();
    let raw = value.map(String::as_str).unwrap_or(fallback.as_str());
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

async fn run_demo(prompt: &str) {
    let manager = SessionManager::from_env();
    let session_id = "demo";

    for text in [prompt, "look", "go north", "go down"] {
        let response = manager.narrate(session_id, text).await;
        println!("> {text}");
        match serde_json::to_string_pretty(&response) {
            Ok(payload) => println!("{payload}"),
            Err(err) => eprintln!("could not render response: {err}"),
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving world engine on http://{addr}");
                if let Err(err) = serve(addr).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("demo") => {
            let prompt = args
                .get(2)
                .map(String::as_str)
                .unwrap_or("A windy coast of pine islands.");
            run_demo(prompt).await;
        }
        _ => {
            print_usage();
        }
    }
}
