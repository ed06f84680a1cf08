//! The interactive conversation loop.
//!
//! One [`ConversationController`] drives one session over a line-oriented
//! console:
//!
//! ```text
//! Idle → MaybeInitiate → AwaitInput → Classify
//!      → {PreferenceDetected | SearchRequested | AnswerRequested | Unrecognized}
//!      → Respond → Idle
//! ```
//!
//! An exit command (or end of input) moves to `Terminated`. The inactivity
//! monitor runs for the lifetime of [`ConversationController::run`] and is
//! joined before it returns.

use std::io::BufRead;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{ChatConfig, MonitorConfig};
use crate::error::{ChatResult, PreferenceError, SessionError, SessionResult};
use crate::fetch::{ContentFetcher, SearchRequest, fetch_or_fallback};
use crate::learn::engagement::{EngagementAction, EngagementScheduler, ReplySentiment};
use crate::learn::response::{ResponseCatalog, ResponsePick, ResponseSelector, TrainingReport};
use crate::message::{ChatMessage, MessageSink};
use crate::monitor::{ActivityClock, InactivityMonitor};
use crate::nlu::Classifier;
use crate::preference::{AddOutcome, PreferenceStore, detect_preference};

pub const GREETING: &str = "Olá! Como posso ajudar? (Digite 'sair' para encerrar)";
pub const FAREWELL: &str = "Até logo!";
pub const NOT_UNDERSTOOD: &str = "Desculpe, não entendi.";
pub const PROACTIVE_PROMPT: &str = "Oi! Quer conversar?";

const EXIT_COMMANDS: &[&str] = &["sair", "exit", "quit"];

pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim().to_lowercase();
    EXIT_COMMANDS.contains(&input.as_str())
}

// ---------------------------------------------------------------------------
// Turn state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    MaybeInitiate,
    AwaitInput,
    Classify,
    PreferenceDetected,
    SearchRequested,
    AnswerRequested,
    Unrecognized,
    Respond,
    Terminated,
}

/// What a user line asks for, before any classifier is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Exit,
    Preference(String),
    Search(SearchRequest),
    /// Ordinary conversation, handed to the classifier.
    Chat,
}

impl Intent {
    pub fn of(input: &str) -> Self {
        if is_exit_command(input) {
            Self::Exit
        } else if let Some(item) = detect_preference(input) {
            Self::Preference(item)
        } else if let Some(request) = SearchRequest::detect(input) {
            Self::Search(request)
        } else {
            Self::Chat
        }
    }
}

/// Whether the session keeps going after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub turns: usize,
    pub proactive_prompts: usize,
    pub nudges: usize,
    pub preferences_added: usize,
    pub searches: usize,
    pub not_understood: usize,
}

// ---------------------------------------------------------------------------
// Session context
// ---------------------------------------------------------------------------

/// State owned by one session: the shared activity clock and the preference
/// store. Only the clock ever crosses to another thread.
#[derive(Debug)]
pub struct SessionContext {
    pub clock: ActivityClock,
    pub preferences: PreferenceStore,
}

impl SessionContext {
    pub fn new(preferences: PreferenceStore) -> Self {
        Self {
            clock: ActivityClock::new(),
            preferences,
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct ConversationController<C, F> {
    selector: ResponseSelector,
    scheduler: EngagementScheduler,
    context: SessionContext,
    classifier: C,
    fetcher: F,
    sink: Arc<dyn MessageSink>,
    rng: StdRng,
    monitor: Option<MonitorConfig>,
    seed: Option<u64>,
    state: TurnState,
    summary: SessionSummary,
}

impl<C: Classifier, F: ContentFetcher> ConversationController<C, F> {
    /// Build a controller with an untrained selector and a fresh scheduler.
    pub fn new(
        config: &ChatConfig,
        classifier: C,
        fetcher: F,
        preferences: PreferenceStore,
        sink: Arc<dyn MessageSink>,
    ) -> ChatResult<Self> {
        let selector = ResponseSelector::new(ResponseCatalog::default(), &config.response)?;
        let scheduler = EngagementScheduler::new(&config.engagement);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            selector,
            scheduler,
            context: SessionContext::new(preferences),
            classifier,
            fetcher,
            sink,
            rng,
            monitor: config.monitor.enabled.then(|| config.monitor.clone()),
            seed: config.seed,
            state: TurnState::Idle,
            summary: SessionSummary::default(),
        })
    }

    pub fn with_selector(mut self, selector: ResponseSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_scheduler(mut self, scheduler: EngagementScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_clock(mut self, clock: ActivityClock) -> Self {
        self.context.clock = clock;
        self
    }

    /// Train the response selector offline. Call once before [`Self::run`].
    pub fn bootstrap(&mut self) -> TrainingReport {
        self.selector.train(&mut self.rng)
    }

    /// Run the session until an exit command or end of input.
    pub fn run<R: BufRead>(&mut self, mut input: R) -> SessionResult<SessionSummary> {
        tracing::info!("session started");
        self.say(ChatMessage::reply(GREETING));

        let mut monitor = self.monitor.as_ref().map(|config| {
            InactivityMonitor::spawn(
                self.context.clock.clone(),
                Arc::clone(&self.sink),
                config,
                self.seed.map(|s| s.wrapping_add(1)),
            )
        });

        let result = self.converse(&mut input);

        if let Some(monitor) = monitor.as_mut() {
            monitor.stop();
            self.summary.nudges = monitor.nudge_count();
        }
        self.state = TurnState::Terminated;
        tracing::info!(turns = self.summary.turns, "session ended");
        result.map(|()| self.summary.clone())
    }

    fn converse<R: BufRead>(&mut self, input: &mut R) -> SessionResult<()> {
        loop {
            self.state = TurnState::MaybeInitiate;
            if self.maybe_initiate(input)? == Flow::Exit {
                return Ok(());
            }

            self.state = TurnState::AwaitInput;
            let Some(line) = read_line(input)? else {
                self.say(ChatMessage::reply(FAREWELL));
                return Ok(());
            };
            if self.handle_line(&line) == Flow::Exit {
                return Ok(());
            }
        }
    }

    /// Ask the engagement scheduler whether to speak first, and learn from
    /// the reply if it did.
    fn maybe_initiate<R: BufRead>(&mut self, input: &mut R) -> SessionResult<Flow> {
        let bucket = self.scheduler.bucket_for(self.context.clock.elapsed());
        let action = self.scheduler.decide(bucket, &mut self.rng);
        tracing::debug!(%bucket, ?action, "engagement decision");
        if action == EngagementAction::StaySilent {
            return Ok(Flow::Continue);
        }

        self.summary.proactive_prompts += 1;
        self.say(ChatMessage::proactive(PROACTIVE_PROMPT));

        let Some(reply) = read_line(input)? else {
            self.say(ChatMessage::reply(FAREWELL));
            return Ok(Flow::Exit);
        };
        if is_exit_command(&reply) {
            self.say(ChatMessage::reply(FAREWELL));
            return Ok(Flow::Exit);
        }

        let sentiment = ReplySentiment::classify(&reply);
        // Lookahead is read before the clock is touched.
        let next = self.scheduler.bucket_for(self.context.clock.elapsed());
        self.scheduler
            .learn(bucket, EngagementAction::Speak, sentiment, next);
        self.context.clock.touch();
        Ok(Flow::Continue)
    }

    /// Process one user line. Public so a caller can drive turns without a
    /// console (the engagement step is skipped).
    pub fn handle_line(&mut self, line: &str) -> Flow {
        let text = line.trim();
        self.state = TurnState::Classify;
        let reply = match Intent::of(text) {
            Intent::Exit => {
                self.say(ChatMessage::reply(FAREWELL));
                self.state = TurnState::Terminated;
                return Flow::Exit;
            }
            _ if text.is_empty() => {
                self.context.clock.touch();
                self.state = TurnState::Idle;
                return Flow::Continue;
            }
            Intent::Preference(item) => {
                self.record_turn();
                self.state = TurnState::PreferenceDetected;
                self.remember(&item)
            }
            Intent::Search(request) => {
                self.record_turn();
                self.state = TurnState::SearchRequested;
                self.summary.searches += 1;
                let text = fetch_or_fallback(&self.fetcher, &request);
                ChatMessage::Search {
                    provider: request.provider.label().into(),
                    term: request.term,
                    text,
                }
            }
            Intent::Chat => {
                self.record_turn();
                self.answer(text)
            }
        };

        self.state = TurnState::Respond;
        self.say(reply);
        self.state = TurnState::Idle;
        Flow::Continue
    }

    fn record_turn(&mut self) {
        self.context.clock.touch();
        self.summary.turns += 1;
    }

    fn answer(&mut self, text: &str) -> ChatMessage {
        let classification = self.classifier.classify(text);
        match self
            .selector
            .pick_response(classification.state, classification.confidence)
        {
            ResponsePick::Respond(response) => {
                self.state = TurnState::AnswerRequested;
                let mut response = response.to_string();
                if let Some(remark) = self.context.preferences.remark_for(text) {
                    response.push_str(&remark);
                }
                ChatMessage::reply(response)
            }
            ResponsePick::NotUnderstood => {
                self.state = TurnState::Unrecognized;
                self.summary.not_understood += 1;
                ChatMessage::reply(NOT_UNDERSTOOD)
            }
        }
    }

    fn remember(&mut self, item: &str) -> ChatMessage {
        match self.context.preferences.add(item) {
            Ok(AddOutcome::Added(item)) => {
                self.summary.preferences_added += 1;
                ChatMessage::reply(format!("Legal! Vou lembrar que você gosta de {item}."))
            }
            Ok(AddOutcome::AlreadyKnown(item)) => {
                ChatMessage::reply(format!("Eu já sabia que você gosta de {item}!"))
            }
            Err(PreferenceError::Empty) => ChatMessage::reply(NOT_UNDERSTOOD),
            Err(e) => {
                // Kept in memory for the rest of the session.
                tracing::warn!("{e}");
                self.say(ChatMessage::warning(&e));
                self.summary.preferences_added += 1;
                ChatMessage::reply(format!("Legal! Vou lembrar que você gosta de {item}."))
            }
        }
    }

    fn say(&self, msg: ChatMessage) {
        self.sink.emit(&msg);
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn clock(&self) -> &ActivityClock {
        &self.context.clock
    }

    pub fn scheduler(&self) -> &EngagementScheduler {
        &self.scheduler
    }

    pub fn selector(&self) -> &ResponseSelector {
        &self.selector
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.context.preferences
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }
}

/// Read one line without its terminator; `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> SessionResult<Option<String>> {
    let mut buf = String::new();
    let n = input
        .read_line(&mut buf)
        .map_err(|source| SessionError::Input { source })?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchResult};
    use crate::learn::response::DEFAULT_PHRASES;
    use crate::message::VecSink;
    use crate::nlu::{Classification, LexicalClassifier};
    use std::io::Cursor;

    struct EchoFetcher;

    impl ContentFetcher for EchoFetcher {
        fn fetch(&self, request: &SearchRequest) -> FetchResult<String> {
            Ok(format!("sobre {}", request.term))
        }
    }

    struct BrokenFetcher;

    impl ContentFetcher for BrokenFetcher {
        fn fetch(&self, request: &SearchRequest) -> FetchResult<String> {
            Err(FetchError::Transport {
                provider: request.provider.label().into(),
                message: "connection refused".into(),
            })
        }
    }

    struct Fixed(Classification);

    impl Classifier for Fixed {
        fn classify(&self, _utterance: &str) -> Classification {
            self.0
        }
    }

    fn quiet_config() -> ChatConfig {
        let mut config = ChatConfig::default();
        config.seed = Some(11);
        config.monitor.enabled = false;
        config.engagement.epsilon = 0.0;
        config.response.episodes = 20_000;
        config
    }

    fn controller<F: ContentFetcher>(
        dir: &tempfile::TempDir,
        fetcher: F,
    ) -> (ConversationController<LexicalClassifier, F>, Arc<VecSink>) {
        let sink = Arc::new(VecSink::new());
        let mut c = ConversationController::new(
            &quiet_config(),
            LexicalClassifier::new(&DEFAULT_PHRASES),
            fetcher,
            PreferenceStore::open(dir.path().join("prefs.json")),
            sink.clone(),
        )
        .unwrap();
        c.bootstrap();
        (c, sink)
    }

    fn replies(sink: &VecSink) -> Vec<String> {
        sink.messages()
            .iter()
            .filter_map(|m| m.text().map(str::to_string))
            .collect()
    }

    #[test]
    fn intent_routing() {
        assert_eq!(Intent::of("SAIR"), Intent::Exit);
        assert_eq!(Intent::of("eu gosto de pizza"), Intent::Preference("pizza".into()));
        assert!(matches!(Intent::of("o que é rust"), Intent::Search(_)));
        assert_eq!(Intent::of("bom dia"), Intent::Chat);
    }

    #[test]
    fn everyday_chat_is_not_routed_to_search() {
        for line in [
            "sabe o que eu comi hoje",
            "gosto muito de mapas antigos",
            "a research paper",
        ] {
            assert_eq!(Intent::of(line), Intent::Chat, "{line}");
        }
    }

    #[test]
    fn exit_line_terminates_without_touching_the_clock() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut c, sink) = controller(&dir, EchoFetcher);
        c.clock().rewind(std::time::Duration::from_secs(90));
        assert_eq!(c.handle_line("  Quit "), Flow::Exit);
        assert_eq!(c.state(), TurnState::Terminated);
        assert_eq!(replies(&sink), vec![FAREWELL]);
        assert!(c.clock().elapsed() >= std::time::Duration::from_secs(90));
        assert_eq!(c.summary().turns, 0);
    }

    #[test]
    fn blank_line_only_counts_as_activity() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut c, sink) = controller(&dir, EchoFetcher);
        c.clock().rewind(std::time::Duration::from_secs(90));
        assert_eq!(c.handle_line("   "), Flow::Continue);
        assert!(sink.is_empty());
        assert_eq!(c.summary().turns, 0);
        assert!(c.clock().elapsed() < std::time::Duration::from_secs(60));
    }

    #[test]
    fn greets_and_says_goodbye() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut c, sink) = controller(&dir, EchoFetcher);
        let summary = c.run(Cursor::new("sair\n")).unwrap();
        assert_eq!(replies(&sink), vec![GREETING, FAREWELL]);
        assert_eq!(summary.turns, 0);
        assert_eq!(c.state(), TurnState::Terminated);
    }

    #[test]
    fn end_of_input_ends_the_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut c, sink) = controller(&dir, EchoFetcher);
        c.run(Cursor::new("")).unwrap();
        assert_eq!(replies(&sink).last().map(String::as_str), Some(FAREWELL));
    }

    #[test]
    fn known_phrase_gets_a_learned_response() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut c, sink) = controller(&dir, EchoFetcher);
        c.handle_line("Boa noite!");
        let expected = c.selector().respond_with(4).to_string();
        assert_eq!(replies(&sink), vec![expected]);
        assert_eq!(c.state(), TurnState::Idle);
    }

    #[test]
    fn low_confidence_is_not_understood() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = Arc::new(VecSink::new());
        let mut c = ConversationController::new(
            &quiet_config(),
            Fixed(Classification {
                state: 0,
                confidence: 0.3,
            }),
            EchoFetcher,
            PreferenceStore::open(dir.path().join("prefs.json")),
            sink.clone(),
        )
        .unwrap();
        c.handle_line("blablabla");
        assert_eq!(replies(&sink), vec![NOT_UNDERSTOOD]);
        assert_eq!(c.summary().not_understood, 1);
    }

    #[test]
    fn preference_is_remembered_and_personalizes_replies() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut c, sink) = controller(&dir, EchoFetcher);
        c.handle_line("Eu gosto de Pizza");
        assert!(c.preferences().contains("pizza"));
        c.handle_line("gosto de pizza");
        // Mentions "pizza" with a confident greeting.
        let sink2 = Arc::new(VecSink::new());
        let mut c2 = ConversationController::new(
            &quiet_config(),
            Fixed(Classification {
                state: 0,
                confidence: 0.9,
            }),
            EchoFetcher,
            PreferenceStore::open(dir.path().join("prefs.json")),
            sink2.clone(),
        )
        .unwrap();
        c2.handle_line("oi, comi pizza hoje");

        let first = replies(&sink);
        assert_eq!(first[0], "Legal! Vou lembrar que você gosta de pizza.");
        assert_eq!(first[1], "Eu já sabia que você gosta de pizza!");
        let personalized = &replies(&sink2)[0];
        assert!(personalized.ends_with("Ah, e eu lembro que você gosta de pizza! 😉"));
    }

    #[test]
    fn search_is_delegated_to_fetcher() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut c, sink) = controller(&dir, EchoFetcher);
        c.handle_line("o que é fotossíntese?");
        match &sink.messages()[0] {
            ChatMessage::Search {
                provider,
                term,
                text,
            } => {
                assert_eq!(provider, "wikipedia");
                assert_eq!(term, "fotossíntese");
                assert_eq!(text, "sobre fotossíntese");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fetch_failure_becomes_fallback_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut c, sink) = controller(&dir, BrokenFetcher);
        c.handle_line("pesquise sobre rust");
        assert_eq!(replies(&sink), vec![crate::fetch::NOT_FOUND_TEXT]);
    }

    #[test]
    fn long_silence_with_trained_scheduler_prompts_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let (c, sink) = controller(&dir, EchoFetcher);
        let config = quiet_config();
        let mut scheduler = EngagementScheduler::new(&config.engagement);
        use crate::learn::engagement::SilenceBucket;
        scheduler.learn(
            SilenceBucket::Long,
            EngagementAction::Speak,
            ReplySentiment::Affirmative,
            SilenceBucket::Long,
        );
        let clock = ActivityClock::new();
        clock.rewind(std::time::Duration::from_secs(130));
        let mut c = c.with_scheduler(scheduler).with_clock(clock);

        let before = c.scheduler().value(SilenceBucket::Long, EngagementAction::Speak);
        let summary = c.run(Cursor::new("sim\nsair\n")).unwrap();

        assert_eq!(replies(&sink), vec![GREETING, PROACTIVE_PROMPT, FAREWELL]);
        assert_eq!(summary.proactive_prompts, 1);
        assert!(c.scheduler().value(SilenceBucket::Long, EngagementAction::Speak) > before);
        assert!(c.clock().elapsed() < std::time::Duration::from_secs(60));
    }

    #[test]
    fn exit_as_reply_to_proactive_prompt_terminates() {
        let dir = tempfile::TempDir::new().unwrap();
        let (c, sink) = controller(&dir, EchoFetcher);
        let config = quiet_config();
        let mut scheduler = EngagementScheduler::new(&config.engagement);
        use crate::learn::engagement::SilenceBucket;
        scheduler.learn(
            SilenceBucket::Recent,
            EngagementAction::Speak,
            ReplySentiment::Affirmative,
            SilenceBucket::Recent,
        );
        let mut c = c.with_scheduler(scheduler);
        c.run(Cursor::new("sair\nnunca lido\n")).unwrap();
        assert_eq!(replies(&sink), vec![GREETING, PROACTIVE_PROMPT, FAREWELL]);
    }
}
