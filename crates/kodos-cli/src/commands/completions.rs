use clap::CommandFactory;
use clap_complete::Shell;
use std::process::ExitCode;

pub fn run<C: CommandFactory>(shell: Shell) -> ExitCode {
    clap_complete::generate(shell, &mut C::command(), "kodos", &mut std::io::stdout());
    ExitCode::SUCCESS
}
