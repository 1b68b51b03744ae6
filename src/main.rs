use kmerdb::{cli, commands};

fn main() {
    let cli = cli::parse_cli();

    if let Err(e) = commands::dispatch_command(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
