use crate::cli::Cli;

/// Validate CLI flags that clap's type system can't express on its own.
pub fn validate(cli: &Cli) -> Result<(), String> {
    if cli.connect_timeout < 0.0 {
        return Err("The --connect-timeout argument must not be negative.".into());
    }
    if cli.listen.parse::<std::net::SocketAddr>().is_err() {
        return Err(format!("The --listen argument {:?} is not a valid address.", cli.listen));
    }
    Ok(())
}
