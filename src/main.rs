fn main() -> anyhow::Result<()> {
    panelforge::cli::run_cli()
}
