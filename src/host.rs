//! Browser host loop: watches navigation, schedules detection passes on result
//! pages, and relays extracted results to the submission client.

use std::{sync::Arc, time::Duration};

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
	ExamResultMessage, is_result_url,
	api::{ApiClient, Session, SubmitOutcome},
	config::AppConfig,
	extract::{self, Extraction},
};

/// User-facing reaction to a submission attempt. The two states are mutually
/// exclusive; showing one replaces the other.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Feedback {
	Success,
	AuthRequired,
}

impl Feedback {
	fn banner_text(&self) -> &'static str {
		match self {
			Feedback::Success => "Результаты экзамена успешно сохранены",
			Feedback::AuthRequired => "Нужно авторизоваться или зарегистрироваться",
		}
	}

	fn banner_color(&self) -> &'static str {
		match self {
			Feedback::Success => "rgba(40, 140, 60, 0.9)",
			Feedback::AuthRequired => "rgba(231, 42, 9, 0.9)",
		}
	}
}

/// Main host loop. Polls the page URL; on every navigation onto a result page,
/// spawns one bounded detection schedule. Messages from detection passes are
/// consumed strictly in arrival order, without de-duplication: if two passes
/// both find the result, the backend receives two submissions.
///
/// Submissions run on their own task so the URL poll keeps observing
/// navigation while a request is in flight; the single consumer preserves
/// arrival order.
pub async fn run(page: &Page, config: &AppConfig, client: &ApiClient, session: Arc<Session>) -> Result<()> {
	let (tx, mut rx) = mpsc::channel::<String>(16);

	let consumer = {
		let page = page.clone();
		let client = client.clone();
		tokio::spawn(async move {
			while let Some(raw) = rx.recv().await {
				handle_message(&page, &client, &session, &raw).await;
			}
		})
	};

	let poll_loop = async {
		let mut last_url = current_url(page).await?;
		if is_result_url(&last_url) {
			spawn_detection(page.clone(), config.clone(), tx.clone(), last_url.clone());
		}

		let poll = Duration::from_millis(config.url_poll_interval_ms);

		loop {
			tokio::time::sleep(poll).await;
			let url = current_url(page).await?;
			if url != last_url {
				debug!(%url, "Navigation change");
				if is_result_url(&url) {
					info!(%url, "Result page detected, scheduling extraction");
					spawn_detection(page.clone(), config.clone(), tx.clone(), url.clone());
				}
				last_url = url;
			}
		}
	};

	let result: Result<()> = poll_loop.await;
	consumer.abort();
	result
}

/// Process one raw page message. Malformed payloads are logged and dropped;
/// they never take the host down.
async fn handle_message(page: &Page, client: &ApiClient, session: &Session, raw: &str) {
	let msg = match ExamResultMessage::parse(raw) {
		Ok(Some(msg)) => msg,
		Ok(None) => return,
		Err(e) => {
			warn!("Malformed page message, dropping: {}", e);
			return;
		}
	};

	info!(
		correct = msg.correct_answers,
		total = msg.total_questions,
		time = %msg.exam_time,
		source = %msg.source,
		"Exam result extracted"
	);

	let result = msg.into_result();
	let feedback = match client.submit_result(session, &result).await {
		SubmitOutcome::Success => {
			info!("Exam result stored on the backend");
			Feedback::Success
		}
		SubmitOutcome::AuthRequired => {
			warn!("Submission requires authorization");
			Feedback::AuthRequired
		}
	};

	if let Err(e) = show_feedback(page, feedback).await {
		warn!("Failed to show feedback banner: {}", e);
	}
}

/// Number of unconditional detection passes per navigation event; later
/// passes are retries that stop at the first success
const FIXED_PASSES: u32 = 2;

/// Delay before the given detection pass (1-based). The second pass lands at
/// the configured absolute offset from page load; retries use the fixed retry
/// delay.
fn detect_delay(attempt: u32, config: &AppConfig) -> Duration {
	let ms = match attempt {
		0 | 1 => config.initial_detect_delay_ms,
		2 => config.second_detect_delay_ms.saturating_sub(config.initial_detect_delay_ms),
		_ => config.retry_detect_delay_ms,
	};
	Duration::from_millis(ms)
}

/// Whether the schedule ends after emitting on this pass. Both fixed passes
/// run and emit independently - a result found by each is submitted each time,
/// without de-duplication - while retries stop at the first success.
fn stops_after_emit(attempt: u32) -> bool {
	attempt >= FIXED_PASSES
}

/// The URL to stamp on an extracted result: the live page URL when readable,
/// else the URL the schedule was spawned for
fn effective_url(current: Option<String>, nav_url: &str) -> String {
	match current {
		Some(url) if !url.is_empty() => url,
		_ => nav_url.to_string(),
	}
}

/// One bounded detection schedule for a single navigation event onto `nav_url`.
///
/// Cadence: two fixed passes (initial delay, then the longer second offset),
/// then fixed-delay retries while nothing was found, up to
/// `max_detect_attempts`. The schedule is not cancelled on navigation: a late
/// pass re-reads the live DOM, finds no result marker, and emits nothing.
fn spawn_detection(page: Page, config: AppConfig, tx: mpsc::Sender<String>, nav_url: String) {
	tokio::spawn(async move {
		for attempt in 1..=config.max_detect_attempts {
			tokio::time::sleep(detect_delay(attempt, &config)).await;

			let extraction = match extract::detect(&page).await {
				Ok(extraction) => extraction,
				Err(e) => {
					// Page context may be gone after navigation; the pass just ends
					debug!("Detection pass {} failed: {}", attempt, e);
					continue;
				}
			};

			match extraction {
				Extraction::Found(found) if found.is_submittable() => {
					let url = effective_url(current_url(&page).await.ok(), &nav_url);
					let msg = ExamResultMessage {
						kind: ExamResultMessage::TAG.to_string(),
						correct_answers: found.correct_answers,
						total_questions: found.total_questions,
						exam_time: found.exam_time.unwrap_or_default(),
						source: if attempt == 1 { "initial".to_string() } else { "retry".to_string() },
						url,
					};
					match serde_json::to_string(&msg) {
						Ok(raw) =>
							if tx.send(raw).await.is_err() {
								debug!("Host loop gone, dropping extracted result");
								return;
							},
						Err(e) => warn!("Failed to serialize result message: {}", e),
					}
					if stops_after_emit(attempt) {
						return;
					}
				}
				Extraction::Found(found) => {
					// Zero count = page not rendered yet, keep retrying
					debug!(correct = found.correct_answers, total = found.total_questions, "Zero count on pass {}, retrying", attempt);
				}
				Extraction::NotFound => {
					debug!("No result marker on pass {}", attempt);
				}
			}
		}

		debug!("Detection gave up after {} passes", config.max_detect_attempts);
	});
}

async fn current_url(page: &Page) -> Result<String> {
	Ok(page.url().await.map_err(|e| eyre!("Failed to get page URL: {}", e))?.unwrap_or_default())
}

/// Inject a dismissable feedback banner into the page. Replaces any previous
/// banner, so the two feedback states never show together.
async fn show_feedback(page: &Page, feedback: Feedback) -> Result<()> {
	let script = format!(
		r#"
		(function() {{
			const existing = document.getElementById('pdd-relay-banner');
			if (existing) existing.remove();

			const banner = document.createElement('div');
			banner.id = 'pdd-relay-banner';
			banner.innerText = '{}';
			banner.style.position = 'fixed';
			banner.style.bottom = '20px';
			banner.style.left = '50%';
			banner.style.transform = 'translateX(-50%)';
			banner.style.backgroundColor = '{}';
			banner.style.color = 'white';
			banner.style.padding = '10px 20px';
			banner.style.borderRadius = '5px';
			banner.style.zIndex = '9999';
			banner.style.cursor = 'pointer';
			banner.onclick = () => banner.remove();
			document.body.appendChild(banner);
			return true;
		}})()
		"#,
		feedback.banner_text(),
		feedback.banner_color()
	);

	page.evaluate(script).await.map_err(|e| eyre!("Failed to inject banner: {}", e))?;
	Ok(())
}
