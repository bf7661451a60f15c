use std::{path::PathBuf, sync::Arc};

use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use pdd_headless::{
	api::{ApiClient, Session},
	config::AppConfig,
	host,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pdd_headless")]
#[command(about = "Relay PDD practice exam results from drom.ru to the study-app backend", long_about = None)]
struct Args {
	/// Page to open first (exam or topic training page)
	#[arg(short, long, default_value = "https://www.drom.ru/pdd/")]
	start_url: String,

	/// Backend username; with --password, logs in before watching
	#[arg(short, long)]
	username: Option<String>,

	/// Backend password
	#[arg(short, long)]
	password: Option<String>,

	/// Run with visible browser window (non-headless mode)
	#[arg(long)]
	visible: bool,

	/// Optional JSON config file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Print the backend's stored exam results and exit
	#[arg(long)]
	list_results: bool,

	/// Clear the stored token and exit
	#[arg(long)]
	logout: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdd_headless=info")))
		.init();

	let args = Args::parse();

	let mut config = match &args.config {
		Some(path) => AppConfig::load(path)?,
		None => AppConfig::default(),
	};
	if args.visible {
		config.visible = true;
	}

	let mut session = Session::open()?;

	if args.logout {
		session.clear()?;
		info!("Logged out, stored token cleared");
		return Ok(());
	}

	let client = ApiClient::new(&config.api_base, std::time::Duration::from_secs(config.http_timeout_secs))?;

	if let (Some(username), Some(password)) = (&args.username, &args.password) {
		client.login(&mut session, username, password).await?;
	} else if session.is_logged_in() {
		// Validate the persisted token; a 401/403 here clears it
		match client.fetch_profile(&mut session).await {
			Ok(Some(_)) => info!("Stored token is valid"),
			Ok(None) => warn!("Stored token rejected; results will not be submitted until login"),
			Err(e) => warn!("Could not verify stored token: {}", e),
		}
	} else {
		warn!("No stored token; results will not be submitted until login");
	}

	if args.list_results {
		let results = client.fetch_results(&session).await?;
		for record in &results {
			println!(
				"#{}  {}/{}  time {}  at {}  ({})",
				record.id, record.result.correct_answers, record.result.total_questions, record.result.exam_time, record.result.timestamp, record.result.url_ref
			);
		}
		info!("{} result(s) on the backend", results.len());
		return Ok(());
	}

	// Configure browser based on visibility flag
	let browser_config = if config.visible {
		BrowserConfig::builder().with_head().build().map_err(|e| eyre!("Failed to build browser config: {}", e))?
	} else {
		BrowserConfig::builder().build().map_err(|e| eyre!("Failed to build browser config: {}", e))?
	};

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Consume CDP events so the browser connection does not stall
	let handle = tokio::spawn(async move { while handler.next().await.is_some() {} });

	let page = browser.new_page(args.start_url.as_str()).await.map_err(|e| eyre!("Failed to open page: {}", e))?;
	info!(url = %args.start_url, "Watching for exam results (Ctrl+C to exit)");

	let session = Arc::new(session);
	tokio::select! {
		result = host::run(&page, &config, &client, session) => {
			result?;
		}
		_ = tokio::signal::ctrl_c() => {
			info!("Interrupted, shutting down");
		}
	}

	drop(page);
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
	drop(browser);
	handle.abort();

	Ok(())
}
