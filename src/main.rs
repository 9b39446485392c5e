fn main() {
    if let Err(e) = live_translator_lib::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
