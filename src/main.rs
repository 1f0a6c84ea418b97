fn main() -> anyhow::Result<()> {
    pantry_tui::cli::run()
}
