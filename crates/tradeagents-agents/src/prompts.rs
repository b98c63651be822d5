//! System and user prompts for the LLM-backed stages.
//!
//! System prompts carry the role and the market context (currency, tool
//! set); the user prompt is a plain-text rendering of the stage's view.

use tradeagents_models::{DebateKind, MarketContext, ReportKind, StateView};

use crate::stage::roles;

fn market_preamble(ctx: &MarketContext) -> String {
    format!(
        "Market: {category}. Quote every price and monetary amount in {code} ({symbol}). \
         Data tools available to this market: {tools}.",
        category = ctx.market_category,
        code = ctx.currency_code,
        symbol = ctx.currency_symbol,
        tools = ctx.tool_set_id,
    )
}

pub fn analyst_system_prompt(report: ReportKind, ctx: &MarketContext) -> String {
    let focus = match report {
        ReportKind::Market => {
            "You are a market analyst. Study price action and technical indicators \
             (moving averages, MACD, RSI, Bollinger bands, ATR, volume) and describe the \
             trend, momentum and volatility regime. End with a markdown table of key points."
        }
        ReportKind::Sentiment => {
            "You are a social media and sentiment analyst. Summarise what retail and \
             professional investors are saying about the company over the past week and \
             how sentiment is shifting. End with a markdown table of key points."
        }
        ReportKind::News => {
            "You are a news analyst. Summarise company news and macroeconomic events from \
             the past week that are relevant to trading this instrument. End with a markdown \
             table of key points."
        }
        ReportKind::Fundamentals => {
            "You are a fundamentals analyst. Review financial statements, valuation, \
             profitability and insider activity, and state what they imply for the stock. \
             End with a markdown table of key points."
        }
        ReportKind::Specialist => {
            "You are a specialist analyst for the local market. Cover market-specific \
             factors: trading rules and price limits, policy and regulatory news, sector \
             rotation and capital flows. End with a markdown table of key points."
        }
    };
    format!(
        "{focus}\n\n{}\n\nWrite a detailed, specific report. Do not recommend a final \
         trade; other stages make that decision.",
        market_preamble(ctx)
    )
}

pub fn voice_system_prompt(role: &str, ctx: &MarketContext) -> String {
    let stance = match role {
        roles::BULL => {
            "You are the Bull researcher. Build the strongest evidence-based case for \
             investing: growth potential, competitive advantages, positive indicators. \
             Rebut the bear's latest arguments directly."
        }
        roles::BEAR => {
            "You are the Bear researcher. Build the strongest evidence-based case against \
             investing: risks, competitive weaknesses, negative indicators. Rebut the \
             bull's latest arguments directly."
        }
        roles::AGGRESSIVE => {
            "You are the Aggressive risk analyst. Champion high-reward opportunities in the \
             trader's plan and challenge overly cautious positions."
        }
        roles::NEUTRAL => {
            "You are the Neutral risk analyst. Weigh upside against downside and argue for \
             a balanced position, challenging both the aggressive and conservative views."
        }
        roles::CONSERVATIVE => {
            "You are the Conservative risk analyst. Protect capital, minimise volatility and \
             argue for the safest sound position, challenging the riskier views."
        }
        other => {
            return format!(
                "You are the {other} participant in a structured debate.\n\n{}",
                market_preamble(ctx)
            )
        }
    };
    format!(
        "{stance}\n\n{}\n\nSpeak conversationally, as in a live debate. Respond to the \
         other participants' most recent points; do not repeat your own earlier turns.",
        market_preamble(ctx)
    )
}

/// Judge prompt. A forced judge must decide; otherwise it may defer by
/// answering `{"decision": null}`.
pub fn judge_system_prompt(kind: DebateKind, forced: bool, ctx: &MarketContext) -> String {
    let role = match kind {
        DebateKind::Research => {
            "You are the judge of the bull/bear investment debate. Decide whether to BUY, \
             SELL or HOLD, and summarise the decisive arguments."
        }
        DebateKind::Risk => {
            "You are the judge of the risk debate between the aggressive, neutral and \
             conservative analysts. Decide how the trader's plan should be adjusted for risk: \
             position size, stops and whether to proceed."
        }
    };
    let instruction = if forced {
        "The debate has ended. You MUST decide now. Respond with ONLY a JSON object: \
         {\"decision\": \"<your decision and rationale>\"}."
    } else {
        "If the debate has not yet produced enough evidence, respond with ONLY \
         {\"decision\": null} and another round will be played. Otherwise respond with ONLY \
         {\"decision\": \"<your decision and rationale>\"}."
    };
    format!("{role}\n\n{}\n\n{instruction}", market_preamble(ctx))
}

pub fn synthesizer_system_prompt(role: &str, ctx: &MarketContext) -> String {
    let task = match role {
        roles::RESEARCH_MANAGER => {
            "You are the research manager. Turn the research judge's decision and the \
             debate into a concrete investment plan: recommendation, rationale and \
             strategic actions."
        }
        roles::TRADER => {
            "You are the trader. Turn the investment plan into a specific trading proposal \
             with entry, sizing and exits. Learn from the past situations provided. Always \
             end with 'FINAL TRANSACTION PROPOSAL: **BUY/HOLD/SELL**'."
        }
        roles::RISK_MANAGER => {
            "You are the risk manager. Using the risk judge's decision and the trader's \
             plan, state the final, risk-adjusted trading decision: BUY, SELL or HOLD with \
             sizing and rationale."
        }
        other => {
            return format!("You are the {other}.\n\n{}", market_preamble(ctx));
        }
    };
    format!("{task}\n\n{}", market_preamble(ctx))
}

/// Render a view as the user prompt. Sections with nothing in them are
/// omitted.
pub fn render_view(view: &StateView) -> String {
    let mut out = format!(
        "Instrument: {}\nAs of: {}\nCurrency: {} ({})\n",
        view.instrument_id, view.as_of_date, view.market.currency_code, view.market.currency_symbol
    );

    for (kind, text) in view.reports.written() {
        out.push_str(&format!("\n## {}\n{}\n", kind.field_name(), text));
    }

    let sections = [
        ("research_debate", Some(view.research_history.as_str()).filter(|s| !s.is_empty())),
        ("research_decision", view.research_decision.as_deref()),
        ("investment_plan", view.investment_plan.as_deref()),
        ("trader_plan", view.trader_plan.as_deref()),
        ("risk_debate", Some(view.risk_history.as_str()).filter(|s| !s.is_empty())),
        ("risk_decision", view.risk_decision.as_deref()),
    ];
    for (title, body) in sections {
        if let Some(body) = body {
            out.push_str(&format!("\n## {title}\n{body}\n"));
        }
    }

    if let Some(debate) = &view.debate {
        out.push_str(&format!("\n## {} round {}\n", debate.kind, debate.round));
        if !debate.own_history.is_empty() {
            out.push_str(&format!("Your previous turns:\n{}\n", debate.own_history));
        }
        for (voice, text) in debate.opponent_responses() {
            out.push_str(&format!("Latest from {voice}: {text}\n"));
        }
    }

    if !view.memories.is_empty() {
        out.push_str("\n## past_reflections\n");
        for m in &view.memories {
            out.push_str(&format!("- (similarity {:.2}) {}\n", m.similarity_score, m.recommendation));
        }
    }
    out
}
