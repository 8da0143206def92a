use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // OE_GATEWAY_SECRET is deliberately absent
    const DISPLAY_ENVS: [&str; 14] = [
        "RUST_LOG",
        "OE_HOST",
        "OE_PORT",
        "OE_DATABASE_URL",
        "OE_DB_MAX_CONNECTIONS",
        "OE_NODE_ID",
        "OE_RETRY_MAX_ATTEMPTS",
        "OE_RETRY_BASE_DELAY_MS",
        "OE_RETRY_MAX_DELAY_MS",
        "OE_CHECKOUT_LOCK_TTL_MS",
        "OE_UNPAID_ORDER_TIMEOUT",
        "OE_EXPIRY_INTERVAL",
        "OE_GATEWAY_SIGNATURE_CHECKS",
        "OE_EVENT_BUFFER_SIZE",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
