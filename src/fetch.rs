//! Content search dispatch.
//!
//! A user request such as "o que é fotossíntese" or "pesquise sobre Rust" is
//! turned into a [`SearchRequest`]: a search term plus a [`Provider`] picked
//! by keyword. Any [`ContentFetcher`] resolves it to text. Failures never
//! reach the conversation loop as errors; [`fetch_or_fallback`] turns them
//! into a "nothing found" reply.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use crate::error::{FetchError, FetchResult};

/// Reply used whenever a search comes back empty or fails.
pub const NOT_FOUND_TEXT: &str = "Não encontrei informações sobre isso.";

/// Longest extract returned to the user, in characters.
const MAX_EXTRACT_CHARS: usize = 600;

const USER_AGENT: &str = concat!("chat-friend/", env!("CARGO_PKG_VERSION"));

/// Where a search term gets resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Encyclopedia,
    WebSearch,
    Maps,
    TechnicalExplainer,
}

/// Keyword cues per provider, checked in order. Web search is the default.
const PROVIDER_CUES: &[(Provider, &[&str])] = &[
    (
        Provider::Maps,
        &["onde fica", "mapa", "endereço", "como chegar", "where is", "map of"],
    ),
    (
        Provider::TechnicalExplainer,
        &["como funciona", "explique", "explica", "how does", "explain"],
    ),
    (
        Provider::Encyclopedia,
        &["o que é", "o que e", "quem é", "quem foi", "wikipedia", "what is", "who is"],
    ),
];

/// Verbs that mark a plain web search.
const SEARCH_VERBS: &[&str] = &[
    "pesquise sobre",
    "pesquise",
    "pesquisar",
    "procure por",
    "procure",
    "busque",
    "buscar",
    "search for",
    "search",
];

/// A compiled cue; `provider` is `None` for plain search verbs.
struct Cue {
    provider: Option<Provider>,
    text: &'static str,
    pattern: Regex,
}

/// Every cue, matched on word boundaries so "mapas" or "research" do not fire.
static CUES: LazyLock<Vec<Cue>> = LazyLock::new(|| {
    PROVIDER_CUES
        .iter()
        .flat_map(|(provider, cues)| cues.iter().map(move |cue| (Some(*provider), *cue)))
        .chain(SEARCH_VERBS.iter().map(|cue| (None, *cue)))
        .map(|(provider, text)| Cue {
            provider,
            text,
            pattern: Regex::new(&format!(r"\b{}\b", regex::escape(text))).unwrap(),
        })
        .collect()
});

impl Provider {
    /// Pick a provider by keyword matching on the query text.
    pub fn select(query: &str) -> Self {
        let lower = query.to_lowercase();
        CUES.iter()
            .filter_map(|cue| cue.provider.map(|provider| (provider, &cue.pattern)))
            .find(|(_, pattern)| pattern.is_match(&lower))
            .map(|(provider, _)| provider)
            .unwrap_or(Self::WebSearch)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Encyclopedia => "wikipedia",
            Self::WebSearch => "duckduckgo",
            Self::Maps => "openstreetmap",
            Self::TechnicalExplainer => "explainer",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A search the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub provider: Provider,
    pub term: String,
}

impl SearchRequest {
    /// Recognize a search request and strip its cue words, leaving the term.
    ///
    /// Returns `None` for ordinary conversation or when no term remains.
    pub fn detect(input: &str) -> Option<Self> {
        let lower = input.trim().to_lowercase();
        // Earliest cue wins; at the same position the longer one does.
        let end = CUES
            .iter()
            .filter_map(|cue| {
                cue.pattern
                    .find(&lower)
                    .map(|m| (m.start(), m.end(), cue.text.len()))
            })
            .min_by_key(|(start, _, len)| (*start, std::cmp::Reverse(*len)))
            .map(|(_, end, _)| end)?;

        let term = lower[end..]
            .trim()
            .trim_start_matches("sobre ")
            .trim_start_matches("about ")
            .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
            .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
            .to_string();
        if term.is_empty() {
            return None;
        }
        Some(Self {
            provider: Provider::select(&lower),
            term,
        })
    }
}

/// Resolves search requests to informational text.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, request: &SearchRequest) -> FetchResult<String>;
}

impl<F: ContentFetcher + ?Sized> ContentFetcher for Box<F> {
    fn fetch(&self, request: &SearchRequest) -> FetchResult<String> {
        (**self).fetch(request)
    }
}

/// Fetch, degrading any failure to [`NOT_FOUND_TEXT`].
pub fn fetch_or_fallback(fetcher: &dyn ContentFetcher, request: &SearchRequest) -> String {
    match fetcher.fetch(request) {
        Ok(text) => text,
        Err(FetchError::Empty { .. }) | Err(FetchError::Offline) => NOT_FOUND_TEXT.to_string(),
        Err(e) => {
            tracing::warn!(provider = %request.provider, term = %request.term, "search failed: {e}");
            NOT_FOUND_TEXT.to_string()
        }
    }
}

/// Fetcher that never goes online.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl ContentFetcher for OfflineFetcher {
    fn fetch(&self, _request: &SearchRequest) -> FetchResult<String> {
        Err(FetchError::Offline)
    }
}

/// Fetcher backed by public HTTP APIs via `ureq`.
pub struct HttpContentFetcher {
    agent: ureq::Agent,
    language: String,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            language: "pt".into(),
        }
    }

    /// Wikipedia language edition used by the encyclopedia provider.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn get_json(&self, provider: Provider, request: ureq::Request) -> FetchResult<Value> {
        match request.call() {
            Ok(response) => response.into_json().map_err(|e| FetchError::Decode {
                provider: provider.label().into(),
                message: e.to_string(),
            }),
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status {
                provider: provider.label().into(),
                status,
            }),
            Err(ureq::Error::Transport(transport)) => Err(FetchError::Transport {
                provider: provider.label().into(),
                message: transport.to_string(),
            }),
        }
    }

    fn encyclopedia(&self, term: &str) -> FetchResult<Option<String>> {
        let url = format!("https://{}.wikipedia.org/w/api.php", self.language);
        let request = self
            .agent
            .get(&url)
            .query("action", "query")
            .query("prop", "extracts")
            .query("exintro", "1")
            .query("explaintext", "1")
            .query("redirects", "1")
            .query("format", "json")
            .query("titles", term);
        let json = self.get_json(Provider::Encyclopedia, request)?;
        Ok(wikipedia_extract(&json))
    }

    fn duckduckgo(&self, provider: Provider, term: &str) -> FetchResult<Option<String>> {
        let request = self
            .agent
            .get("https://api.duckduckgo.com/")
            .query("q", term)
            .query("format", "json")
            .query("no_html", "1")
            .query("skip_disambig", "1");
        let json = self.get_json(provider, request)?;
        Ok(match provider {
            Provider::TechnicalExplainer => {
                non_empty(&json["Definition"]).or_else(|| duckduckgo_abstract(&json))
            }
            _ => duckduckgo_abstract(&json),
        })
    }

    fn maps(&self, term: &str) -> FetchResult<Option<String>> {
        let request = self
            .agent
            .get("https://nominatim.openstreetmap.org/search")
            .query("q", term)
            .query("format", "json")
            .query("limit", "1");
        let json = self.get_json(Provider::Maps, request)?;
        Ok(nominatim_place(&json))
    }
}

impl ContentFetcher for HttpContentFetcher {
    fn fetch(&self, request: &SearchRequest) -> FetchResult<String> {
        let term = request.term.as_str();
        let found = match request.provider {
            Provider::Encyclopedia => self.encyclopedia(term)?,
            Provider::Maps => self.maps(term)?,
            provider @ (Provider::WebSearch | Provider::TechnicalExplainer) => {
                self.duckduckgo(provider, term)?
            }
        };
        found.map(|text| truncate_chars(&text, MAX_EXTRACT_CHARS)).ok_or_else(|| {
            FetchError::Empty {
                provider: request.provider.label().into(),
                term: term.into(),
            }
        })
    }
}

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn wikipedia_extract(json: &Value) -> Option<String> {
    json["query"]["pages"]
        .as_object()?
        .values()
        .find_map(|page| non_empty(&page["extract"]))
}

fn duckduckgo_abstract(json: &Value) -> Option<String> {
    non_empty(&json["AbstractText"]).or_else(|| {
        json["RelatedTopics"]
            .as_array()?
            .iter()
            .find_map(|topic| non_empty(&topic["Text"]))
    })
}

fn nominatim_place(json: &Value) -> Option<String> {
    let place = json.as_array()?.first()?;
    let name = non_empty(&place["display_name"])?;
    match (place["lat"].as_str(), place["lon"].as_str()) {
        (Some(lat), Some(lon)) => Some(format!("{name} (lat {lat}, lon {lon})")),
        _ => Some(name),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encyclopedia_language_defaults_to_portuguese() {
        let fetcher = HttpContentFetcher::new(Duration::from_secs(1));
        assert_eq!(fetcher.language, "pt");
        let fetcher = fetcher.with_language("en");
        assert_eq!(fetcher.language, "en");
    }

    #[test]
    fn provider_selection_by_keyword() {
        assert_eq!(Provider::select("onde fica Lisboa"), Provider::Maps);
        assert_eq!(Provider::select("como funciona um motor"), Provider::TechnicalExplainer);
        assert_eq!(Provider::select("O que é fotossíntese"), Provider::Encyclopedia);
        assert_eq!(Provider::select("pesquise receitas"), Provider::WebSearch);
    }

    #[test]
    fn detect_strips_cue_words() {
        assert_eq!(
            SearchRequest::detect("o que é fotossíntese?"),
            Some(SearchRequest {
                provider: Provider::Encyclopedia,
                term: "fotossíntese".into(),
            })
        );
        assert_eq!(
            SearchRequest::detect("Pesquise sobre Rust"),
            Some(SearchRequest {
                provider: Provider::WebSearch,
                term: "rust".into(),
            })
        );
        assert_eq!(
            SearchRequest::detect("onde fica o Porto"),
            Some(SearchRequest {
                provider: Provider::Maps,
                term: "o porto".into(),
            })
        );
    }

    #[test]
    fn ordinary_chat_is_not_a_search() {
        assert_eq!(SearchRequest::detect("bom dia"), None);
        assert_eq!(SearchRequest::detect("pesquise"), None);
    }

    #[test]
    fn cues_inside_longer_words_do_not_fire() {
        assert_eq!(SearchRequest::detect("sabe o que eu comi hoje"), None);
        assert_eq!(SearchRequest::detect("gosto muito de mapas antigos"), None);
        assert_eq!(SearchRequest::detect("a research paper"), None);
        assert_eq!(Provider::select("mapas antigos"), Provider::WebSearch);
        assert_eq!(
            SearchRequest::detect("me mostra o mapa de Lisboa"),
            Some(SearchRequest {
                provider: Provider::Maps,
                term: "de lisboa".into(),
            })
        );
    }

    #[test]
    fn offline_fetch_falls_back() {
        let request = SearchRequest::detect("o que é rust").unwrap();
        assert_eq!(fetch_or_fallback(&OfflineFetcher, &request), NOT_FOUND_TEXT);
    }

    #[test]
    fn parses_wikipedia_extract() {
        let json = json!({"query": {"pages": {"123": {"title": "Rust", "extract": " Rust é uma linguagem. "}}}});
        assert_eq!(wikipedia_extract(&json), Some("Rust é uma linguagem.".into()));
        let missing = json!({"query": {"pages": {"-1": {"title": "Xyz", "missing": ""}}}});
        assert_eq!(wikipedia_extract(&missing), None);
    }

    #[test]
    fn parses_duckduckgo_abstract_or_topic() {
        let json = json!({"AbstractText": "", "RelatedTopics": [{"Text": "Rust (linguagem)"}]});
        assert_eq!(duckduckgo_abstract(&json), Some("Rust (linguagem)".into()));
    }

    #[test]
    fn parses_nominatim_place() {
        let json = json!([{"display_name": "Porto, Portugal", "lat": "41.1", "lon": "-8.6"}]);
        assert_eq!(
            nominatim_place(&json),
            Some("Porto, Portugal (lat 41.1, lon -8.6)".into())
        );
        assert_eq!(nominatim_place(&json!([])), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ação", 2), "aç…");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
