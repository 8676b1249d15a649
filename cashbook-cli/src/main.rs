use anyhow::Result;
use cashbook_cli::app;

fn main() -> Result<()> {
    app::run()
}
