fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = lbcscan::cli::Args::parse();
    if let Err(e) = lbcscan::logging::init(args.verbose, args.quiet) {
        eprintln!("{:#}", e);
    }
    if let Err(e) = lbcscan::cli::run(&args) {
        eprintln!("{}", e);
        if args.verbose > 0 {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
