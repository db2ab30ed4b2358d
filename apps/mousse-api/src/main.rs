use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = mousse_api::Args::parse();

	mousse_api::run(args).await
}
