use serde::{Deserialize, Serialize};

pub mod api;
pub mod config;
pub mod extract;
pub mod host;

/// Path substrings that identify a PDD exam result page. Matched case-sensitively
/// against the full URL on every navigation change.
pub const RESULT_PATHS: [&str; 2] = ["drom.ru/pdd/exam/result", ".drom.ru/pdd/themes/traffic_signs/training/result"];

/// Detects if a URL is a PDD exam result page
pub fn is_result_url(url: &str) -> bool {
	RESULT_PATHS.iter().any(|p| url.contains(p))
}

/// Normalized exam result as submitted to the backend.
///
/// Field names follow the backend's JSON contract, hence the camelCase renames.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExamResult {
	#[serde(rename = "correctAnswers")]
	pub correct_answers: u32,
	#[serde(rename = "totalQuestions")]
	pub total_questions: u32,
	/// Elapsed exam time formatted "MM:SS"; "00:00" when the page did not expose it
	#[serde(rename = "examTime")]
	pub exam_time: String,
	/// Set at submission time, not extraction time (RFC 3339, UTC)
	pub timestamp: String,
	/// The page URL the result was extracted from
	#[serde(rename = "urlRef")]
	pub url_ref: String,
}

/// A result record as returned by `GET /exam_results` (server-assigned id included)
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoredExamResult {
	pub id: i64,
	#[serde(flatten)]
	pub result: ExamResult,
}

/// Message relayed from the page-side detection task to the host loop.
/// One direction only; the host processes these strictly in arrival order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExamResultMessage {
	/// Message tag, always "examResult"
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(rename = "correctAnswers")]
	pub correct_answers: u32,
	#[serde(rename = "totalQuestions")]
	pub total_questions: u32,
	#[serde(rename = "examTime", default)]
	pub exam_time: String,
	/// Which detection pass produced this ("initial", "retry", ...)
	pub source: String,
	/// Page URL at the moment of extraction
	pub url: String,
}

impl ExamResultMessage {
	pub const TAG: &'static str = "examResult";

	/// Parse a raw page message. Returns None for valid JSON that is not an
	/// examResult message; malformed JSON is an error the caller logs and drops.
	pub fn parse(raw: &str) -> Result<Option<Self>, serde_json::Error> {
		let value: serde_json::Value = serde_json::from_str(raw)?;
		if value.get("type").and_then(|t| t.as_str()) != Some(Self::TAG) {
			return Ok(None);
		}
		serde_json::from_value(value).map(Some)
	}

	/// Enrich into a submittable result, stamping the submission time now
	pub fn into_result(self) -> ExamResult {
		ExamResult {
			correct_answers: self.correct_answers,
			total_questions: self.total_questions,
			exam_time: if self.exam_time.is_empty() { "00:00".to_string() } else { self.exam_time },
			timestamp: chrono::Utc::now().to_rfc3339(),
			url_ref: self.url,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn result_url_detection() {
		assert!(is_result_url("https://www.drom.ru/pdd/exam/result/?score=18"));
		assert!(is_result_url("https://spb.drom.ru/pdd/themes/traffic_signs/training/result/"));
		assert!(!is_result_url("https://www.drom.ru/pdd/exam/"));
		assert!(!is_result_url("https://www.drom.ru/pdd/themes/traffic_signs/training/"));
		// Case-sensitive by contract
		assert!(!is_result_url("https://www.DROM.RU/PDD/EXAM/RESULT"));
	}

	#[test]
	fn message_parse_valid() {
		let raw = r#"{"type":"examResult","correctAnswers":18,"totalQuestions":20,"examTime":"05:30","source":"initial","url":"https://www.drom.ru/pdd/exam/result/"}"#;
		let msg = ExamResultMessage::parse(raw).unwrap().unwrap();
		assert_eq!(msg.correct_answers, 18);
		assert_eq!(msg.total_questions, 20);
		assert_eq!(msg.exam_time, "05:30");
	}

	#[test]
	fn message_parse_other_tag_ignored() {
		let raw = r#"{"type":"adRemoved","count":3}"#;
		assert!(ExamResultMessage::parse(raw).unwrap().is_none());
	}

	#[test]
	fn message_parse_malformed_is_error() {
		assert!(ExamResultMessage::parse("not json {").is_err());
	}

	#[test]
	fn into_result_defaults_time() {
		let msg = ExamResultMessage {
			kind: ExamResultMessage::TAG.to_string(),
			correct_answers: 18,
			total_questions: 20,
			exam_time: String::new(),
			source: "initial".to_string(),
			url: "https://www.drom.ru/pdd/exam/result/".to_string(),
		};
		let result = msg.into_result();
		assert_eq!(result.exam_time, "00:00");
		assert_eq!(result.url_ref, "https://www.drom.ru/pdd/exam/result/");
		assert!(!result.timestamp.is_empty());
	}

	#[test]
	fn exam_result_serializes_with_backend_field_names() {
		let result = ExamResult {
			correct_answers: 18,
			total_questions: 20,
			exam_time: "05:30".to_string(),
			timestamp: "2026-08-23T10:00:00Z".to_string(),
			url_ref: "https://www.drom.ru/pdd/exam/result/".to_string(),
		};
		let json = serde_json::to_value(&result).unwrap();
		assert_eq!(json["correctAnswers"], 18);
		assert_eq!(json["totalQuestions"], 20);
		assert_eq!(json["examTime"], "05:30");
		assert_eq!(json["urlRef"], "https://www.drom.ru/pdd/exam/result/");
	}
}
