use modlink::App;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let (_loader, summary) = App::new()
        .config_file("modlink_config.json")
        .show_manifests(true)
        .run()?;

    if !summary.errored.is_empty() {
        tracing::warn!("出错的 mod: {:?}", summary.errored);
    }
    Ok(())
}
