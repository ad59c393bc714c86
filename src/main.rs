fn main() -> anyhow::Result<()> {
    smarthttp::cli::run_cli()
}
