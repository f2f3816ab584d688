mod app;
mod mouse;
pub use app::App;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let app = App::new()?;
    app.run()?;

    Ok(())
}
