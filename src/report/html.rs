use super::analysis::{
    endpoint_stats, failure_breakdown, false_positives, format_duration, response_series,
    response_stats,
};
use super::chart;
use super::types::ReportMetadata;
use super::{ReportFormat, ReportRenderer};
use crate::error::RenderError;
use crate::runner::state::{OutcomeStatus, RunSummary};

pub struct HtmlRenderer;

impl ReportRenderer for HtmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn file_name(&self) -> &'static str {
        "test_report.html"
    }

    fn render(
        &self,
        summary: &RunSummary,
        metadata: &ReportMetadata,
    ) -> Result<Vec<u8>, RenderError> {
        Ok(generate_html(summary, metadata).into_bytes())
    }
}

fn generate_html(summary: &RunSummary, metadata: &ReportMetadata) -> String {
    let pass_rate = summary.pass_rate();

    let mut units_html = String::new();
    for (i, outcome) in summary.outcomes.iter().enumerate() {
        let (status_icon, status_class) = match &outcome.status {
            OutcomeStatus::Passed => ("✓", "passed"),
            OutcomeStatus::Failed { .. } => ("✗", "failed"),
            OutcomeStatus::Skipped { .. } => ("○", "skipped"),
            OutcomeStatus::Errored { .. } => ("!", "errored"),
        };

        let message_html = match &outcome.status {
            OutcomeStatus::Passed => String::new(),
            OutcomeStatus::Skipped { reason } => {
                format!(r#"<div class="skip-reason">{}</div>"#, html_escape(reason))
            }
            other => format!(
                r#"<div class="error-message">{}</div>"#,
                html_escape(other.message().unwrap_or(""))
            ),
        };

        let diagnostic_html = match &outcome.status {
            OutcomeStatus::Failed {
                diagnostic: Some(diagnostic),
                ..
            } => format!(
                r#"<details class="diagnostic"><summary>Diagnostic</summary><pre>{}</pre></details>"#,
                html_escape(diagnostic)
            ),
            _ => String::new(),
        };

        units_html.push_str(&format!(
            r#"
                <div class="unit {status_class}">
                    <div class="unit-icon">{status_icon}</div>
                    <div class="unit-content">
                        <div class="unit-name">{index}. {name}</div>
                        <div class="unit-meta">
                            {suite_html}<span class="unit-id">{id}</span>
                            <span class="duration">{duration}</span>
                            <span class="status-label">{label}</span>
                        </div>
                        {message_html}
                        {diagnostic_html}
                    </div>
                </div>"#,
            index = i + 1,
            name = html_escape(&outcome.name),
            id = html_escape(&outcome.unit_id),
            suite_html = outcome
                .suite
                .as_deref()
                .map(|s| format!(r#"<span class="suite">{}</span>"#, html_escape(s)))
                .unwrap_or_default(),
            duration = format_duration(outcome.duration_ms),
            label = outcome.status.label(),
        ));
    }
    if units_html.is_empty() {
        units_html.push_str(r#"<div class="empty">No tests were discovered.</div>"#);
    }

    let breakdown = failure_breakdown(summary);
    let problems: u32 = breakdown.iter().map(|(_, n)| n).sum();
    let mut failures_html = String::new();
    for &(category, count) in &breakdown {
        failures_html.push_str(&format!(
            "<tr><td>{}</td><td class=\"num\">{}</td></tr>",
            category, count
        ));
    }

    let summary_chart = chart::donut(&[
        ("Passed", summary.passed, "#10b981"),
        ("Failed", summary.failed, "#ef4444"),
        ("Skipped", summary.skipped, "#f59e0b"),
        ("Errored", summary.errored, "#8b5cf6"),
    ]);
    let failure_chart = if problems == 0 {
        String::new()
    } else {
        chart::bars(&breakdown, "#ef4444")
    };

    let response_html = match response_stats(summary) {
        Some(stats) => {
            let mut rows = String::new();
            for ep in endpoint_stats(summary) {
                rows.push_str(&format!(
                    "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{:.0}ms</td><td class=\"num\">{}ms</td></tr>",
                    html_escape(&ep.endpoint),
                    ep.count,
                    ep.average_ms,
                    ep.max_ms
                ));
            }
            format!(
                r#"
        <section>
            <h2>Response Time Statistics</h2>
            <div class="chart-box">{}</div>
            <table>
                <tr><td>Requests</td><td class="num">{}</td></tr>
                <tr><td>Average</td><td class="num">{:.0}ms</td></tr>
                <tr><td>Median</td><td class="num">{:.0}ms</td></tr>
                <tr><td>Min</td><td class="num">{}ms</td></tr>
                <tr><td>Max</td><td class="num">{}ms</td></tr>
                <tr><td>p90</td><td class="num">{}ms</td></tr>
                <tr><td>p95</td><td class="num">{}ms</td></tr>
            </table>
            <table>
                <tr><th>Endpoint</th><th>Calls</th><th>Average</th><th>Max</th></tr>
                {}
            </table>
        </section>"#,
                chart::lines(&response_series(summary)),
                stats.count,
                stats.average_ms,
                stats.median_ms,
                stats.min_ms,
                stats.max_ms,
                stats.p90_ms,
                stats.p95_ms,
                rows
            )
        }
        None => String::new(),
    };

    let started = summary
        .started_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    let finished = summary
        .finished_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>API Test Report - {project}</title>
    <style>
        :root {{
            --bg-primary: #0a0f1d;
            --bg-secondary: #141b2d;
            --bg-tertiary: #1f2937;
            --border: #374151;
            --text-primary: #f9fafb;
            --text-secondary: #9ca3af;
            --green: #10b981;
            --red: #ef4444;
            --yellow: #f59e0b;
            --purple: #8b5cf6;
        }}

        * {{ margin: 0; padding: 0; box-sizing: border-box; }}

        body {{
            font-family: 'Inter', system-ui, -apple-system, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.5;
            padding: 3rem 1rem;
        }}

        .container {{ max-width: 1100px; margin: 0 auto; }}

        header {{
            margin-bottom: 3rem;
            display: flex;
            justify-content: space-between;
            align-items: flex-end;
        }}

        h1 {{ font-size: 2.25rem; font-weight: 800; letter-spacing: -0.025em; }}
        h2 {{ font-size: 1.25rem; font-weight: 700; margin-bottom: 1rem; }}

        .labels {{ color: var(--text-secondary); font-size: 0.875rem; }}

        .summary {{
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(160px, 1fr));
            gap: 1.5rem;
            margin-bottom: 3rem;
        }}

        .stat {{
            background: var(--bg-secondary);
            border: 1px solid var(--border);
            padding: 1.5rem;
            border-radius: 1rem;
        }}

        .stat-value {{ font-size: 2.5rem; font-weight: 800; }}
        .stat-label {{
            color: var(--text-secondary);
            font-size: 0.875rem;
            text-transform: uppercase;
            letter-spacing: 0.05em;
        }}

        .stat.passed .stat-value {{ color: var(--green); }}
        .stat.failed .stat-value, .stat.errored .stat-value {{ color: var(--red); }}
        .stat.skipped .stat-value, .stat.false-positive .stat-value {{ color: var(--yellow); }}

        .chart-box {{ display: flex; justify-content: center; margin-bottom: 1rem; overflow-x: auto; }}
        .unit-meta .suite {{ color: var(--purple); }}

        .progress-container {{ margin-bottom: 3rem; }}
        .progress-bar {{
            background: var(--bg-secondary);
            height: 12px;
            border-radius: 6px;
            overflow: hidden;
            border: 1px solid var(--border);
        }}
        .progress-fill {{ height: 100%; background: linear-gradient(90deg, var(--green), #34d399); }}

        section {{
            background: var(--bg-secondary);
            border: 1px solid var(--border);
            border-radius: 1.25rem;
            margin-bottom: 2rem;
            padding: 1.5rem;
        }}

        table {{ width: 100%; border-collapse: collapse; margin-bottom: 1rem; }}
        th, td {{ text-align: left; padding: 0.5rem 0.75rem; border-bottom: 1px solid var(--border); }}
        th {{ color: var(--text-secondary); font-size: 0.75rem; text-transform: uppercase; }}
        td.num {{ text-align: right; font-family: 'JetBrains Mono', monospace; }}

        .unit {{
            padding: 1rem;
            border-radius: 0.75rem;
            display: flex;
            align-items: flex-start;
            gap: 1rem;
            margin-bottom: 0.5rem;
        }}
        .unit:hover {{ background: var(--bg-tertiary); }}

        .unit-icon {{
            width: 2rem;
            height: 2rem;
            display: flex;
            align-items: center;
            justify-content: center;
            border-radius: 0.5rem;
            font-size: 1.25rem;
            flex-shrink: 0;
        }}
        .unit.passed .unit-icon {{ background: rgba(16, 185, 129, 0.1); color: var(--green); }}
        .unit.failed .unit-icon, .unit.errored .unit-icon {{ background: rgba(239, 68, 68, 0.1); color: var(--red); }}
        .unit.skipped .unit-icon {{ background: rgba(245, 158, 11, 0.1); color: var(--yellow); }}

        .unit-content {{ flex: 1; min-width: 0; }}
        .unit-name {{ font-family: 'JetBrains Mono', monospace; font-weight: 500; }}
        .unit-meta {{ display: flex; gap: 1rem; margin-top: 0.25rem; color: var(--text-secondary); font-size: 0.75rem; }}

        .error-message {{
            background: rgba(239, 68, 68, 0.1);
            border-radius: 0.5rem;
            padding: 0.75rem;
            margin-top: 0.75rem;
            color: #fca5a5;
            font-size: 0.8125rem;
            font-family: 'JetBrains Mono', monospace;
            border: 1px solid rgba(239, 68, 68, 0.2);
        }}
        .skip-reason {{ margin-top: 0.5rem; color: var(--yellow); font-size: 0.8125rem; }}

        .diagnostic {{ margin-top: 0.75rem; }}
        .diagnostic summary {{ cursor: pointer; color: var(--purple); font-weight: 600; }}
        .diagnostic pre {{
            margin-top: 0.5rem;
            padding: 0.75rem;
            background: rgba(0, 0, 0, 0.3);
            border-radius: 0.5rem;
            white-space: pre-wrap;
            word-break: break-word;
            font-size: 0.8125rem;
        }}

        .empty {{ color: var(--text-secondary); text-align: center; padding: 2rem; }}

        .meta {{
            margin-top: 4rem;
            padding-top: 2rem;
            border-top: 1px solid var(--border);
            color: var(--text-secondary);
            font-size: 0.875rem;
            display: flex;
            justify-content: center;
            gap: 2rem;
        }}
    </style>
</head>
<body>
    <div class="container">
        <header>
            <div>
                <div style="font-size: 0.875rem; font-weight: 600; color: var(--purple); text-transform: uppercase; letter-spacing: 0.1em; margin-bottom: 0.5rem;">API Testing</div>
                <h1>{project}</h1>
                <div class="labels">Environment: {environment} &middot; Test cycle: {cycle}</div>
            </div>
            <div style="text-align: right;">
                <div style="font-size: 0.875rem; color: var(--text-secondary);">Run Duration</div>
                <div style="font-size: 1.25rem; font-weight: 700;">{duration}</div>
            </div>
        </header>

        <div class="summary">
            <div class="stat"><div class="stat-value">{total}</div><div class="stat-label">Total</div></div>
            <div class="stat passed"><div class="stat-value">{passed}</div><div class="stat-label">Passed</div></div>
            <div class="stat failed"><div class="stat-value">{failed}</div><div class="stat-label">Failed</div></div>
            <div class="stat skipped"><div class="stat-value">{skipped}</div><div class="stat-label">Skipped</div></div>
            <div class="stat errored"><div class="stat-value">{errored}</div><div class="stat-label">Errored</div></div>
            <div class="stat false-positive"><div class="stat-value">{false_positives}</div><div class="stat-label">False Positives</div></div>
        </div>

        <div class="chart-box">{summary_chart}</div>

        <div class="progress-container">
            <div style="display: flex; justify-content: space-between; margin-bottom: 0.75rem;">
                <span style="font-weight: 600; font-size: 0.875rem;">Pass Rate</span>
                <span style="font-weight: 700; color: var(--green);">{pass_rate:.1}%</span>
            </div>
            <div class="progress-bar">
                <div class="progress-fill" style="width: {pass_rate:.1}%"></div>
            </div>
        </div>

        <section>
            <h2>Detailed Test Cases</h2>
            {units_html}
        </section>

        <section>
            <h2>Failure Analysis</h2>
            <div class="chart-box">{failure_chart}</div>
            <table>
                <tr><th>Failure Type</th><th>Count</th></tr>
                {failures_html}
            </table>
        </section>
        {response_html}

        <section>
            <h2>Environment Information</h2>
            <table>
                <tr><td>Base API URL</td><td>{base_url}</td></tr>
                <tr><td>Tool Version</td><td>{tool_version}</td></tr>
                <tr><td>Platform</td><td>{os} ({arch})</td></tr>
                <tr><td>Hostname</td><td>{hostname}</td></tr>
                <tr><td>CPU Cores</td><td>{cpu_cores}</td></tr>
                <tr><td>Execution Started</td><td>{started}</td></tr>
                <tr><td>Execution Finished</td><td>{finished}</td></tr>
            </table>
        </section>

        <div class="meta">
            <span>Run: {run_id}</span>
            <span>Generated: {generated}</span>
        </div>
    </div>
</body>
</html>"#,
        project = html_escape(&metadata.project_name),
        environment = html_escape(&metadata.environment_name),
        cycle = html_escape(&metadata.test_cycle),
        duration = format_duration(summary.duration_ms),
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        errored = summary.errored,
        false_positives = false_positives(summary),
        summary_chart = summary_chart,
        failure_chart = failure_chart,
        pass_rate = pass_rate,
        units_html = units_html,
        failures_html = failures_html,
        response_html = response_html,
        base_url = html_escape(&metadata.base_url),
        tool_version = metadata.env.tool_version,
        os = metadata.env.os,
        arch = metadata.env.arch,
        hostname = html_escape(&metadata.env.hostname),
        cpu_cores = metadata.env.cpu_cores,
        started = started,
        finished = finished,
        run_id = html_escape(&metadata.run_id),
        generated = metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
