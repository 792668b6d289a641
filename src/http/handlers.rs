//! Request handlers.
//!
//! - `/` greets
//! - `/dice`, `/dice/{player}` roll a six-sided die and report the roll as a
//!   span attribute, a `dice.rolls` increment and a correlated log record

use axum::extract::{Path, Query, State};
use opentelemetry::trace::{TraceContextExt, Tracer as _};
use opentelemetry::Context;
use rand::Rng;

use crate::http::middleware::RequestTrace;
use crate::http::server::AppState;
use crate::observability::{DiceInstruments, SpanGuard};

pub const GREETING: &str = "Hola, Mundo!";

pub async fn hello() -> &'static str {
    tracing::info!("{GREETING}");
    GREETING
}

pub async fn dice(
    State(state): State<AppState>,
    RequestTrace(cx): RequestTrace,
    Query(params): Query<Vec<(String, String)>>,
) -> String {
    let roll = roll_dice(&state.dice, &cx, player_param(&params));
    format!("{roll}\n")
}

pub async fn dice_for_player(
    State(state): State<AppState>,
    RequestTrace(cx): RequestTrace,
    Path(player): Path<String>,
) -> String {
    let roll = roll_dice(&state.dice, &cx, Some(&player));
    format!("{roll}\n")
}

/// First non-empty `player` query value.
///
/// Query parameters are taken as raw pairs so repeated or valueless keys
/// never reject a roll.
pub fn player_param(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(key, value)| key == "player" && !value.is_empty())
        .map(|(_, value)| value.as_str())
}

/// Log message for a roll; blank names count as anonymous.
pub fn roll_message(player: Option<&str>) -> String {
    match player.filter(|name| !name.is_empty()) {
        Some(name) => format!("{name} is rolling the dice"),
        None => "Anonymous player is rolling the dice".to_string(),
    }
}

/// Roll once under a `roll` span parented on `parent`.
///
/// The span, counter increment and log record are all committed before this
/// returns, so nothing that happens to the response afterwards can lose them.
pub fn roll_dice(dice: &DiceInstruments, parent: &Context, player: Option<&str>) -> u8 {
    let guard = SpanGuard::new(parent.with_span(dice.tracer().start_with_context("roll", parent)));

    let roll: u8 = rand::thread_rng().gen_range(1..=6);
    let message = roll_message(player);

    dice.log_roll(guard.context(), &message, roll);
    dice.record_roll(guard.context(), roll);

    let span_context = guard.span_context();
    tracing::info!(
        trace_id = %span_context.trace_id(),
        span_id = %span_context.span_id(),
        result = roll,
        "{message}"
    );

    roll
}
