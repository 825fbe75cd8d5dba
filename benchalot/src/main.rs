fn main() {
    if let Err(err) = benchalot::run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
