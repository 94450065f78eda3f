use anyhow::Result;

fn main() -> Result<()> {
    graphstore_cli::run()
}
