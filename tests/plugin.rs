#[path = "../crates/kernel/tests/mock_kernel/mod.rs"]
mod mock_kernel;
#[path = "../crates/kernel/tests/utils.rs"]
mod utils;

use googletest::prelude::*;
use kernlink::{
    document::{BlockKind, DisplayBlock, Position, Selection},
    kernel::{SessionConfig, SessionState},
    render::buffer_lines,
    Commands, Config, DisplaySink, LogConfig, Plugin,
};
use mock_kernel::MockProvider;
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;

/// Everything the plugin showed, in order.
#[derive(Debug, Default)]
struct Screen {
    blocks: Vec<DisplayBlock>,
    status: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl DisplaySink for Screen {
    fn blocks(&mut self, blocks: &[DisplayBlock]) {
        self.blocks.extend_from_slice(blocks);
    }

    fn status(&mut self, line: &str) {
        self.status.push(line.to_string());
    }

    fn warning(&mut self, line: &str) {
        self.warnings.push(line.to_string());
    }

    fn error(&mut self, line: &str) {
        self.errors.push(line.to_string());
    }
}

fn plugin(provider: MockProvider) -> Plugin<MockProvider> {
    Plugin::with_dispatch(provider, SessionConfig::default(), Dispatch::none())
}

async fn connected() -> (Plugin<MockProvider>, Screen) {
    let mut plugin = plugin(MockProvider::new());
    let mut screen = Screen::default();
    plugin.connect(&[], &mut screen).await;
    (plugin, screen)
}

fn buffer(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

#[googletest::test]
#[tokio::test]
async fn connect_shows_the_kernel_banner() {
    let (plugin, screen) = connected().await;

    expect_that!(screen.status, elements_are![eq("ipython 8.12.0 / python 3.11.4")]);
    expect_that!(screen.errors, empty());
    expect_that!(plugin.session().state(), eq(SessionState::Connected));
    expect_that!(plugin.session().owns_kernel(), some(eq(true)));
}

#[googletest::test]
#[tokio::test]
async fn existing_flag_attaches_to_the_hinted_kernel() {
    let mut plugin = plugin(MockProvider::with_running_kernel("1234"));
    let mut screen = Screen::default();

    plugin
        .connect(&["--existing".to_string(), "1234".to_string()], &mut screen)
        .await;

    expect_that!(plugin.session().owns_kernel(), some(eq(false)));
    expect_that!(plugin.session().provider().calls().spawned, eq(0));
    expect_that!(screen.status, len(eq(1)));
}

#[googletest::test]
#[tokio::test]
async fn missing_connection_file_is_a_warning() {
    let mut plugin = plugin(MockProvider::new());
    let mut screen = Screen::default();

    plugin.connect(&["-e".to_string()], &mut screen).await;

    expect_that!(
        screen.warnings,
        elements_are![eq("JKernel: Could not find connection file. Not connected!")]
    );
    expect_that!(
        plugin.session().provider().calls().resolved,
        elements_are![eq("kernel-*.json")]
    );
    expect_that!(plugin.session().provider().calls().spawned, eq(0));
    expect_that!(plugin.session().state(), eq(SessionState::Disconnected));
}

#[googletest::test]
#[tokio::test]
async fn bad_arguments_are_reported_once() {
    let mut plugin = plugin(MockProvider::new());
    let mut screen = Screen::default();

    plugin.connect(&["--remote".to_string()], &mut screen).await;

    expect_that!(screen.errors, elements_are![starts_with("JKernel: ")]);
    expect_that!(plugin.session().provider().calls().spawned, eq(0));
}

#[googletest::test]
#[tokio::test]
async fn executing_the_current_line_shows_its_result() {
    let (mut plugin, mut screen) = connected().await;
    let lines = buffer(&["x = 3", "  1+1  "]);

    plugin
        .execute(
            &lines,
            Selection::CurrentLine(2),
            &CancellationToken::new(),
            &mut screen,
        )
        .await;

    expect_that!(plugin.session().provider().calls().executions, elements_are![eq("1+1")]);
    expect_that!(
        screen.blocks.iter().map(|b| b.kind).collect::<Vec<_>>(),
        elements_are![eq(BlockKind::Input), eq(BlockKind::Result)]
    );
    expect_that!(
        buffer_lines(&screen.blocks),
        elements_are![eq("In [1]: 1+1"), eq("Out[1]: 2"), eq(""), eq("In [ ]")]
    );
}

#[googletest::test]
#[tokio::test]
async fn visual_block_is_executed_as_selected() {
    let (mut plugin, mut screen) = connected().await;
    let lines = buffer(&["# try: 1+1 # done"]);
    let selection = Selection::from_marks(Position::new(1, 7), Position::new(1, 9), (1, 1));

    plugin
        .execute(&lines, selection, &CancellationToken::new(), &mut screen)
        .await;

    expect_that!(plugin.session().provider().calls().executions, elements_are![eq("1+1")]);
}

#[googletest::test]
#[tokio::test]
async fn errors_are_shown_without_colors() {
    let (mut plugin, mut screen) = connected().await;
    let lines = buffer(&["buggy("]);

    plugin
        .execute(
            &lines,
            Selection::CurrentLine(1),
            &CancellationToken::new(),
            &mut screen,
        )
        .await;

    let error = screen.blocks.iter().find(|b| b.kind == BlockKind::Error);
    expect_that!(
        error.map(|b| b.lines.clone()),
        some(elements_are![eq("SyntaxError: invalid syntax")])
    );
    expect_that!(screen.errors, empty());
}

#[googletest::test]
#[tokio::test]
async fn blank_selection_is_not_sent() {
    let (mut plugin, mut screen) = connected().await;
    let lines = buffer(&["x = 1", "   ", ""]);

    plugin
        .execute(
            &lines,
            Selection::Lines { first: 2, last: 3 },
            &CancellationToken::new(),
            &mut screen,
        )
        .await;

    expect_that!(plugin.session().provider().calls().executions, empty());
    expect_that!(screen.blocks, empty());
    expect_that!(plugin.session().state(), eq(SessionState::Connected));
}

#[googletest::test]
#[tokio::test]
async fn executing_without_a_kernel_is_an_error() {
    let mut plugin = plugin(MockProvider::new());
    let mut screen = Screen::default();
    let lines = buffer(&["1+1"]);

    plugin
        .execute(
            &lines,
            Selection::CurrentLine(1),
            &CancellationToken::new(),
            &mut screen,
        )
        .await;

    expect_that!(
        screen.errors,
        elements_are![eq("JExecute: no kernel connected")]
    );
    expect_that!(plugin.session().provider().calls().executions, empty());
}

#[googletest::test]
#[tokio::test]
async fn cancelling_keeps_the_connection() {
    let (mut plugin, mut screen) = connected().await;
    let lines = buffer(&["expensive_op()"]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    plugin
        .execute(&lines, Selection::CurrentLine(1), &cancel, &mut screen)
        .await;

    expect_that!(screen.blocks, empty());
    expect_that!(screen.status.last(), some(starts_with("JExecute: ")));
    expect_that!(plugin.session().state(), eq(SessionState::Connected));
}

#[googletest::test]
fn plugin_builds_its_logger_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        log: LogConfig {
            level: "debug".to_string(),
            file: Some(dir.path().join("kernlink.log")),
        },
        ..Config::default()
    };

    let plugin = Plugin::new(MockProvider::new(), &config);

    expect_that!(plugin.is_ok(), eq(true));
    expect_that!(dir.path().join("kernlink.log").exists(), eq(true));
}

#[googletest::test]
#[tokio::test]
async fn shutdown_stops_an_owned_kernel() {
    let (mut plugin, mut screen) = connected().await;

    plugin.shutdown(&mut screen).await;

    expect_that!(plugin.session().state(), eq(SessionState::Disconnected));
    expect_that!(plugin.session().provider().calls().terminated, eq(1));
    expect_that!(screen.errors, empty());
}
