//! Backend HTTP client: login, result submission, and result listing.
//!
//! The bearer token lives in an explicit [`Session`] object rather than ambient
//! storage; components that need the credential receive the session.

use std::{path::PathBuf, time::Duration};

use color_eyre::{Result, eyre::eyre};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{ExamResult, StoredExamResult};

/// Terminal outcome of a submission attempt. Every failure mode collapses into
/// `AuthRequired`; the host decides the user-facing reaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
	Success,
	AuthRequired,
}

/// On-disk credential store: a single token string in one fixed file.
/// Absence of the file means "logged out".
#[derive(Clone, Debug)]
pub struct TokenStore {
	path: PathBuf,
}

impl TokenStore {
	const FILE_NAME: &'static str = "auth_token";

	/// Open the store at the platform state directory
	pub fn open() -> Result<Self> {
		let dir = dirs::state_dir()
			.or_else(dirs::data_local_dir)
			.ok_or_else(|| eyre!("No state directory available on this platform"))?
			.join(env!("CARGO_PKG_NAME"));
		Ok(Self { path: dir.join(Self::FILE_NAME) })
	}

	pub fn at(path: PathBuf) -> Self {
		Self { path }
	}

	pub fn load(&self) -> Option<String> {
		let token = std::fs::read_to_string(&self.path).ok()?;
		let token = token.trim().to_string();
		if token.is_empty() { None } else { Some(token) }
	}

	pub fn save(&self, token: &str) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent).map_err(|e| eyre!("Failed to create state dir {}: {}", parent.display(), e))?;
		}
		std::fs::write(&self.path, token).map_err(|e| eyre!("Failed to persist token: {}", e))
	}

	pub fn clear(&self) -> Result<()> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(eyre!("Failed to clear token: {}", e)),
		}
	}
}

/// In-memory credential with its backing store.
///
/// Lifecycle: set on login success, cleared on explicit logout and on a
/// profile-fetch 401/403. A submission-time 401/403 does NOT clear it.
#[derive(Debug)]
pub struct Session {
	token: Option<String>,
	store: TokenStore,
}

impl Session {
	/// Load the persisted session from the platform state directory
	pub fn open() -> Result<Self> {
		Ok(Self::from_store(TokenStore::open()?))
	}

	pub fn from_store(store: TokenStore) -> Self {
		let token = store.load();
		Self { token, store }
	}

	pub fn token(&self) -> Option<&str> {
		self.token.as_deref()
	}

	pub fn is_logged_in(&self) -> bool {
		self.token.is_some()
	}

	pub fn set_token(&mut self, token: String) -> Result<()> {
		self.store.save(&token)?;
		self.token = Some(token);
		Ok(())
	}

	pub fn clear(&mut self) -> Result<()> {
		self.store.clear()?;
		self.token = None;
		Ok(())
	}
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
}

/// HTTP client for the study-app backend
#[derive(Clone, Debug)]
pub struct ApiClient {
	http: reqwest::Client,
	base: String,
}

impl ApiClient {
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
		Ok(Self { http, base: base_url.trim_end_matches('/').to_string() })
	}

	/// `POST /token` with password grant; stores the returned bearer token in the session
	pub async fn login(&self, session: &mut Session, username: &str, password: &str) -> Result<()> {
		let params = [("username", username), ("password", password), ("grant_type", "password")];
		let response = self
			.http
			.post(format!("{}/token", self.base))
			.form(&params)
			.send()
			.await
			.map_err(|e| eyre!("Login request failed: {}", e))?;

		let status = response.status();
		if !status.is_success() {
			return Err(eyre!("Login failed: HTTP {}", status));
		}

		let token: TokenResponse = response.json().await.map_err(|e| eyre!("Login response was not a token: {}", e))?;
		session.set_token(token.access_token)?;
		info!("Logged in, token stored");
		Ok(())
	}

	/// `POST /exam_result` with the stored bearer token.
	///
	/// With no token present, no network call is made. Any failure - auth,
	/// other status, transport - yields `AuthRequired`; the error detail is
	/// logged here and not propagated.
	pub async fn submit_result(&self, session: &Session, result: &ExamResult) -> SubmitOutcome {
		let Some(token) = session.token() else {
			warn!("No stored token, submission skipped");
			return SubmitOutcome::AuthRequired;
		};

		let response = self
			.http
			.post(format!("{}/exam_result", self.base))
			.bearer_auth(token)
			.json(result)
			.send()
			.await;

		match response {
			Ok(response) => {
				let status = response.status();
				let outcome = classify_submit_status(status);
				if outcome != SubmitOutcome::Success {
					let body = response.text().await.unwrap_or_default();
					warn!(%status, %body, "Result submission rejected");
				}
				outcome
			}
			Err(e) => {
				warn!("Result submission failed: {}", e);
				SubmitOutcome::AuthRequired
			}
		}
	}

	/// `GET /users/me/`. Returns None and clears the session token on 401/403;
	/// this is the only path that invalidates the stored credential.
	pub async fn fetch_profile(&self, session: &mut Session) -> Result<Option<serde_json::Value>> {
		let Some(token) = session.token() else {
			return Ok(None);
		};

		let response = self
			.http
			.get(format!("{}/users/me/", self.base))
			.bearer_auth(token)
			.send()
			.await
			.map_err(|e| eyre!("Profile request failed: {}", e))?;

		let status = response.status();
		if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
			warn!(%status, "Session expired, clearing stored token");
			session.clear()?;
			return Ok(None);
		}
		if !status.is_success() {
			return Err(eyre!("Profile fetch failed: HTTP {}", status));
		}

		let profile = response.json().await.map_err(|e| eyre!("Failed to parse profile: {}", e))?;
		Ok(Some(profile))
	}

	/// `GET /exam_results` - server-stored results for the logged-in user
	pub async fn fetch_results(&self, session: &Session) -> Result<Vec<StoredExamResult>> {
		let Some(token) = session.token() else {
			return Err(eyre!("Not logged in"));
		};

		let response = self
			.http
			.get(format!("{}/exam_results", self.base))
			.bearer_auth(token)
			.send()
			.await
			.map_err(|e| eyre!("Results request failed: {}", e))?;

		let status = response.status();
		if !status.is_success() {
			return Err(eyre!("Results fetch failed: HTTP {}", status));
		}

		response.json().await.map_err(|e| eyre!("Failed to parse results: {}", e))
	}
}

/// 2xx succeeds; everything else, 401/403 included, prompts re-authorization
fn classify_submit_status(status: StatusCode) -> SubmitOutcome {
	if status.is_success() { SubmitOutcome::Success } else { SubmitOutcome::AuthRequired }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_result() -> ExamResult {
		ExamResult {
			correct_answers: 18,
			total_questions: 20,
			exam_time: "05:30".to_string(),
			timestamp: chrono::Utc::now().to_rfc3339(),
			url_ref: "https://www.drom.ru/pdd/exam/result/".to_string(),
		}
	}

	#[test]
	fn submit_status_classification() {
		assert_eq!(classify_submit_status(StatusCode::OK), SubmitOutcome::Success);
		assert_eq!(classify_submit_status(StatusCode::CREATED), SubmitOutcome::Success);
		assert_eq!(classify_submit_status(StatusCode::UNAUTHORIZED), SubmitOutcome::AuthRequired);
		assert_eq!(classify_submit_status(StatusCode::FORBIDDEN), SubmitOutcome::AuthRequired);
		assert_eq!(classify_submit_status(StatusCode::INTERNAL_SERVER_ERROR), SubmitOutcome::AuthRequired);
	}

	#[test]
	fn token_store_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let store = TokenStore::at(dir.path().join("auth_token"));
		assert_eq!(store.load(), None);

		store.save("abc123").unwrap();
		assert_eq!(store.load(), Some("abc123".to_string()));

		store.clear().unwrap();
		assert_eq!(store.load(), None);
		// Clearing an already-absent token is fine
		store.clear().unwrap();
	}

	#[test]
	fn session_lifecycle() {
		let dir = tempfile::tempdir().unwrap();
		let store = TokenStore::at(dir.path().join("auth_token"));
		let mut session = Session::from_store(store.clone());
		assert!(!session.is_logged_in());

		session.set_token("abc123".to_string()).unwrap();
		assert_eq!(session.token(), Some("abc123"));

		// A fresh session picks the persisted token back up
		let reopened = Session::from_store(store);
		assert_eq!(reopened.token(), Some("abc123"));

		session.clear().unwrap();
		assert!(!session.is_logged_in());
	}

	#[tokio::test]
	async fn submit_without_token_makes_no_network_call() {
		let dir = tempfile::tempdir().unwrap();
		let session = Session::from_store(TokenStore::at(dir.path().join("auth_token")));
		// Unroutable base: the precondition check must return before any request
		let client = ApiClient::new("http://127.0.0.1:1", Duration::from_millis(100)).unwrap();
		let outcome = client.submit_result(&session, &test_result()).await;
		assert_eq!(outcome, SubmitOutcome::AuthRequired);
	}

	#[tokio::test]
	async fn submit_transport_error_yields_auth_required() {
		let dir = tempfile::tempdir().unwrap();
		let mut session = Session::from_store(TokenStore::at(dir.path().join("auth_token")));
		session.set_token("stale".to_string()).unwrap();
		let client = ApiClient::new("http://127.0.0.1:1", Duration::from_millis(100)).unwrap();
		let outcome = client.submit_result(&session, &test_result()).await;
		assert_eq!(outcome, SubmitOutcome::AuthRequired);
		// Submission-path failures never clear the stored token
		assert!(session.is_logged_in());
	}
}
