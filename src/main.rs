//! Tokc Compiler Binary

use std::process;
use tokc::{TokenCli, TokenError};

fn main() {
    let mut cli = TokenCli::new();

    match cli.run() {
        Ok(()) => {}
        Err(TokenError::Io(e)) => {
            eprintln!("IO Error: {}", e);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
