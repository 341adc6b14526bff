use noscroll::app::{self, Invocation};

fn main() {
    let options = match app::parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Version) => {
            println!("noscroll {}", noscroll::VERSION);
            return;
        }
        Ok(Invocation::Help) => {
            println!("{}", app::USAGE);
            return;
        }
        Ok(Invocation::Run(options)) => options,
        Err(err) => {
            eprintln!("error: {err:#}");
            eprintln!("Run `noscroll --help` for usage.");
            std::process::exit(2);
        }
    };

    if let Err(err) = noscroll::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
