//! Result-page extraction: an in-page locator script collects candidate text
//! blocks, and an ordered rule chain on the Rust side parses the score and
//! elapsed time out of whichever block was found first.

use std::sync::LazyLock;

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use regex::Regex;
use serde::Deserialize;

/// "18 из 20" - the canonical score form on drom.ru result pages
static COUNTS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*из\s*(\d+)").expect("valid regex"));
/// Looser fallback: any two integers separated by non-digits
static COUNTS_LOOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)[^0-9]+(\d+)").expect("valid regex"));
/// Direct search over raw markup, anchored on the marker phrase
static COUNTS_HTML_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Правильных ответов[^0-9]*(\d+)[^0-9]*из[^0-9]*(\d+)").expect("valid regex"));
/// "05:30"-shaped elapsed time
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2}:\d{2})").expect("valid regex"));
/// Fallback time search anchored on the marker phrase
static TIME_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Время экзамена[^0-9]*([0-9:]+)").expect("valid regex"));

/// Candidate text blocks located inside the page.
///
/// `result_text`/`time_text` are empty when the corresponding element-level
/// stages found nothing; `html` is a bounded sample of the raw markup for the
/// last-resort regex stage.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageBlocks {
	#[serde(default)]
	pub result_text: String,
	#[serde(default)]
	pub time_text: String,
	#[serde(default)]
	pub html: String,
}

/// Outcome of one detection pass
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Extraction {
	Found(FoundResult),
	NotFound,
}

/// Counts and time parsed out of the located blocks
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FoundResult {
	pub correct_answers: u32,
	pub total_questions: u32,
	/// None when no time block matched anywhere
	pub exam_time: Option<String>,
}

impl FoundResult {
	/// A zero count means "page not rendered yet", never a valid zero score;
	/// callers retry instead of submitting (a genuine zero-correct result is
	/// therefore never submitted).
	pub fn is_submittable(&self) -> bool {
		self.correct_answers > 0 && self.total_questions > 0
	}
}

/// In-page stage of the fallback chain: class selector first, then a scan of
/// heading/div/paragraph elements for the marker phrases. The raw-markup stage
/// runs on the Rust side over the returned `html` sample.
const LOCATOR_SCRIPT: &str = r#"
	(function() {
		let resultText = '';
		let timeText = '';

		const resultBlock = document.querySelector('.b-title_type_h3');
		if (resultBlock) {
			resultText = resultBlock.textContent || '';
		}

		for (const el of document.querySelectorAll('h3, div, p')) {
			const text = el.textContent || '';
			if (!resultText && (text.includes('Правильных ответов') || text.includes(' из '))) {
				resultText = text;
			}
			if (!timeText && text.includes('Время экзамена')) {
				timeText = text;
			}
			if (resultText && timeText) break;
		}

		return JSON.stringify({
			result_text: resultText,
			time_text: timeText,
			html: document.documentElement.innerHTML.substring(0, 200000)
		});
	})()
"#;

/// Run the locator script inside the page and deserialize the found blocks
pub async fn locate_blocks(page: &Page) -> Result<PageBlocks> {
	let result = page.evaluate(LOCATOR_SCRIPT).await.map_err(|e| eyre!("Failed to run locator script: {}", e))?;
	let json_str = result.value().and_then(|v| v.as_str()).unwrap_or("{}");
	serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse locator output: {}", e))
}

/// One full detection pass: locate blocks in the live page, then parse
pub async fn detect(page: &Page) -> Result<Extraction> {
	let blocks = locate_blocks(page).await?;
	Ok(extract(&blocks))
}

/// Ordered rule chain over the located blocks, first success wins per field
pub fn extract(blocks: &PageBlocks) -> Extraction {
	let counts = parse_counts(&blocks.result_text).or_else(|| parse_counts_from_html(&blocks.html));

	let Some((correct_answers, total_questions)) = counts else {
		return Extraction::NotFound;
	};

	let exam_time = parse_time(&blocks.time_text).or_else(|| parse_time_from_html(&blocks.html));

	Extraction::Found(FoundResult { correct_answers, total_questions, exam_time })
}

/// Extract the `a из b` pair from an element's text, loose two-integer fallback second
fn parse_counts(text: &str) -> Option<(u32, u32)> {
	for re in [&*COUNTS_RE, &*COUNTS_LOOSE_RE] {
		if let Some(caps) = re.captures(text) {
			let correct = caps.get(1)?.as_str().parse().ok()?;
			let total = caps.get(2)?.as_str().parse().ok()?;
			return Some((correct, total));
		}
	}
	None
}

/// Last-resort stage: marker-anchored search over the raw markup sample
fn parse_counts_from_html(html: &str) -> Option<(u32, u32)> {
	let caps = COUNTS_HTML_RE.captures(html)?;
	let correct = caps.get(1)?.as_str().parse().ok()?;
	let total = caps.get(2)?.as_str().parse().ok()?;
	Some((correct, total))
}

fn parse_time(text: &str) -> Option<String> {
	TIME_RE
		.captures(text)
		.or_else(|| TIME_MARKER_RE.captures(text))
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str().to_string())
}

fn parse_time_from_html(html: &str) -> Option<String> {
	TIME_MARKER_RE.captures(html).and_then(|caps| caps.get(1)).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn blocks(result_text: &str, time_text: &str, html: &str) -> PageBlocks {
		PageBlocks {
			result_text: result_text.to_string(),
			time_text: time_text.to_string(),
			html: html.to_string(),
		}
	}

	#[test]
	fn extracts_from_element_text() {
		let extraction = extract(&blocks("Правильных ответов: 18 из 20", "Время экзамена 05:30", ""));
		assert_eq!(extraction, Extraction::Found(FoundResult {
			correct_answers: 18,
			total_questions: 20,
			exam_time: Some("05:30".to_string()),
		}));
	}

	#[test]
	fn extracts_loose_separator() {
		let extraction = extract(&blocks("Ваш результат — 17/20", "", ""));
		assert_eq!(extraction, Extraction::Found(FoundResult {
			correct_answers: 17,
			total_questions: 20,
			exam_time: None,
		}));
	}

	#[test]
	fn falls_back_to_raw_html() {
		let html = "<div class=\"b-score\">Правильных ответов: <b>19</b> из <b>20</b></div><span>Время экзамена 04:15</span>";
		let extraction = extract(&blocks("", "", html));
		assert_eq!(extraction, Extraction::Found(FoundResult {
			correct_answers: 19,
			total_questions: 20,
			exam_time: Some("04:15".to_string()),
		}));
	}

	#[test]
	fn html_fallback_is_case_insensitive() {
		let extraction = extract(&blocks("", "", "правильных ответов 12 из 20"));
		assert_eq!(extraction, Extraction::Found(FoundResult {
			correct_answers: 12,
			total_questions: 20,
			exam_time: None,
		}));
	}

	#[test]
	fn marker_without_numbers_is_not_found() {
		// Result announcement present but no numeric pattern anywhere
		assert_eq!(extract(&blocks("Экзамен не сдан", "", "<h3>Экзамен не сдан</h3>")), Extraction::NotFound);
	}

	#[test]
	fn empty_page_is_not_found() {
		assert_eq!(extract(&PageBlocks::default()), Extraction::NotFound);
	}

	#[test]
	fn extraction_is_idempotent() {
		let b = blocks("Правильных ответов: 18 из 20", "Время экзамена 05:30", "");
		assert_eq!(extract(&b), extract(&b));
	}

	#[test]
	fn zero_counts_are_not_submittable() {
		let zero = FoundResult { correct_answers: 0, total_questions: 0, exam_time: None };
		assert!(!zero.is_submittable());
		// A parsed zero-correct score is held back too, by contract
		let zero_correct = FoundResult { correct_answers: 0, total_questions: 20, exam_time: None };
		assert!(!zero_correct.is_submittable());
		let valid = FoundResult { correct_answers: 18, total_questions: 20, exam_time: None };
		assert!(valid.is_submittable());
	}

	#[test]
	fn time_marker_fallback() {
		// Single-digit minutes only match the marker-anchored pattern
		assert_eq!(parse_time("Время экзамена: 5:30"), Some("5:30".to_string()));
		assert_eq!(parse_time("Время экзамена 05:30"), Some("05:30".to_string()));
		assert_eq!(parse_time(""), None);
	}
}
