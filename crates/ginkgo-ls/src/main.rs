//
// main.rs
//
// Entry point of the ginkgo-ls binary
//

use std::env;

use ginkgo_ls::backend;

/// What the binary was asked to do
#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Serve,
    Version,
    Usage,
}

fn usage() -> String {
    format!(
        r#"ginkgo-ls {version}, a language server that outlines and runs Ginkgo specs.

Open a *_test.go file in an editor connected over stdio and its Describe,
Context and It blocks are published as a tree ({tree_method}), with a run
lens above each one. Runs invoke the ginkgo CLI on the file's package and
report pass/fail status back into the tree.

Usage: ginkgo-ls [OPTIONS]

Available options:

--stdio                      Start the LSP server using stdio transport
--version                    Print the version
--help                       Print this help message

Commands (workspace/executeCommand):

{run_node:<28} Run one container or spec by key
{run_all:<28} Run every spec of a file
{show_output:<28} Show the captured output of a node
{coverage:<28} Run the package with coverage and report it
{refresh:<28} Re-outline a file now

Environment:

RUST_LOG                     Log filter (env_logger syntax), written to stderr
GINKGO_LS_PERF               Log timings of outline, refresh and run steps
"#,
        version = env!("CARGO_PKG_VERSION"),
        tree_method = backend::TEST_TREE_METHOD,
        run_node = backend::RUN_NODE_COMMAND,
        run_all = backend::RUN_ALL_COMMAND,
        show_output = backend::SHOW_OUTPUT_COMMAND,
        coverage = backend::GENERATE_COVERAGE_COMMAND,
        refresh = backend::REFRESH_COMMAND,
    )
}

fn parse_args(argv: impl IntoIterator<Item = String>) -> anyhow::Result<Mode> {
    let mut mode = Mode::Usage;
    for arg in argv {
        match arg.as_str() {
            "--stdio" => mode = Mode::Serve,
            "--version" => return Ok(Mode::Version),
            "--help" => return Ok(Mode::Usage),
            other => anyhow::bail!("Unknown argument: '{other}' (see --help)"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // skip executable name
    match parse_args(env::args().skip(1))? {
        Mode::Version => println!("ginkgo-ls {}", env!("CARGO_PKG_VERSION")),
        Mode::Usage => print!("{}", usage()),
        Mode::Serve => {
            env_logger::init();
            backend::start_lsp().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_arguments_prints_usage() {
        assert_eq!(parse_args(args(&[])).unwrap(), Mode::Usage);
    }

    #[test]
    fn test_version_wins_over_stdio() {
        assert_eq!(parse_args(args(&["--stdio", "--version"])).unwrap(), Mode::Version);
        assert_eq!(parse_args(args(&["--stdio"])).unwrap(), Mode::Serve);
    }

    #[test]
    fn test_unknown_argument_is_an_error() {
        let err = parse_args(args(&["--tcp"])).unwrap_err();
        assert!(err.to_string().contains("--tcp"));
    }

    #[test]
    fn test_usage_names_the_commands() {
        let text = usage();
        assert!(text.contains("outlines and runs Ginkgo specs"));
        assert!(text.contains(backend::RUN_NODE_COMMAND));
        assert!(text.contains(backend::TEST_TREE_METHOD));
    }
}
