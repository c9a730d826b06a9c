//! Terminal presentation using ratatui.
//!
//! The draw functions take any frame, so the same views render into an
//! inline viewport on stdout or into a test backend.

use crate::coordinator::{CoordinatorHandle, Event, Phase};
use crate::dashboard::{DashboardView, ErrorView};
use crate::eta::LoadingProgress;
use crate::summary::Severity;
use chrono::Utc;
use colored::Colorize;
use crossterm::tty::IsTty;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{BarChart, Block, Gauge, Paragraph, Row, Table, Wrap};
use ratatui::{Frame, Terminal, TerminalOptions, Viewport};
use std::io;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Green,
    }
}

fn score_color(score: f64) -> Color {
    match score {
        s if s >= 50.0 => Color::Red,
        s if s >= 20.0 => Color::Yellow,
        _ => Color::Green,
    }
}

/// Rows needed to show `view` without clipping the table
pub fn dashboard_height(view: &DashboardView) -> u16 {
    let table_rows = view.violations.len().min(30) as u16;
    3 + 6 + 12 + table_rows + 3
}

pub fn draw_dashboard(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let [header, summary, charts, table] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Min(3),
    ])
    .areas(area);

    let score = view.risk_score;
    let gauge = Gauge::default()
        .block(Block::bordered().title(format!(
            " {} · {} violations ",
            view.site_name, view.total_violations
        )))
        .gauge_style(Style::default().fg(score_color(score)))
        .percent(score.round().clamp(0.0, 100.0) as u16)
        .label(format!("Risk score {score} %"));
    frame.render_widget(gauge, header);

    let summary_text = Paragraph::new(view.summary.as_str())
        .wrap(Wrap { trim: true })
        .block(Block::bordered().title(" Summary "));
    frame.render_widget(summary_text, summary);

    let [severity_area, source_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(charts);

    let severity_bars = view.severity.as_bars();
    let severity_chart = BarChart::default()
        .block(Block::bordered().title(" By severity "))
        .data(&severity_bars[..])
        .bar_width(7)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::LightRed));
    frame.render_widget(severity_chart, severity_area);

    let source_bars: Vec<(&str, u64)> = view
        .sources
        .iter()
        .map(|(source, count)| (source.as_str(), *count))
        .collect();
    let source_chart = BarChart::default()
        .block(Block::bordered().title(" By source "))
        .data(source_bars.as_slice())
        .bar_width(9)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::LightBlue));
    frame.render_widget(source_chart, source_area);

    let rows = view.violations.iter().map(|violation| {
        Row::new(vec![
            violation.violating_rule.clone(),
            violation.actual_rule.clone(),
            violation.source.clone(),
            violation.severity.to_string(),
        ])
        .style(Style::default().fg(severity_color(violation.severity)))
    });
    let violations_table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(35),
            Constraint::Percentage(15),
            Constraint::Percentage(10),
        ],
    )
    .header(
        Row::new(vec!["Violating rule", "Actual rule", "Source", "Severity"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::bordered().title(" Violations "));
    frame.render_widget(violations_table, table);
}

pub fn draw_error(frame: &mut Frame, area: Rect, view: &ErrorView) {
    let mut lines = vec![Line::from(view.explanation.as_str()), Line::from("")];
    lines.extend(view.reasons.iter().map(|reason| Line::from(format!("• {reason}"))));

    let title = if view.timed_out {
        " Request timed out "
    } else {
        " Summarisation failed "
    };
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Red))
        .block(Block::bordered().title(title));
    frame.render_widget(paragraph, area);
}

/// Document length label, flagged when the payload hit the cap
fn length_label(progress: &LoadingProgress, max_chars: usize) -> String {
    if progress.is_max_length(max_chars) {
        format!("Document length: {} (maximum)", progress.document_length)
    } else {
        format!("Document length: {}", progress.document_length)
    }
}

pub fn draw_loading(frame: &mut Frame, area: Rect, progress: &LoadingProgress, max_chars: usize) {
    let [info, bar] = Layout::vertical([Constraint::Length(4), Constraint::Length(3)]).areas(area);

    let lines = vec![
        Line::from(length_label(progress, max_chars)),
        Line::from(progress.status_line()),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title(" Summarising ")),
        info,
    );

    if !progress.is_overtime() {
        let gauge = Gauge::default()
            .block(Block::bordered())
            .gauge_style(Style::default().fg(Color::Cyan))
            .percent(progress.percent_complete().round() as u16);
        frame.render_widget(gauge, bar);
    }
}

/// Draw once into an inline viewport below the cursor
fn print_inline<F>(height: u16, draw: F) -> io::Result<()>
where
    F: FnOnce(&mut Frame),
{
    if !io::stdout().is_tty() {
        return Err(io::Error::other("stdout is not a terminal"));
    }
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(height),
        },
    )?;
    terminal.draw(draw)?;
    println!();
    Ok(())
}

/// Print the dashboard; errors mean the caller should fall back to plain text
pub fn print_dashboard(view: &DashboardView) -> io::Result<()> {
    print_inline(dashboard_height(view), |frame| {
        let area = frame.area();
        draw_dashboard(frame, area, view)
    })
}

pub fn print_error(view: &ErrorView) -> io::Result<()> {
    let height = 6 + view.reasons.len() as u16 * 2;
    print_inline(height, |frame| {
        let area = frame.area();
        draw_error(frame, area, view)
    })
}

/// Single status line for the loading ticker
pub fn loading_line(progress: &LoadingProgress, max_chars: usize) -> String {
    let status = if progress.is_overtime() {
        progress.status_line().yellow()
    } else {
        progress.status_line().normal()
    };
    format!("{} | {}", length_label(progress, max_chars), status)
}

/// Report progress on stderr until the pending request resolves.
///
/// Waits for the coordinator to commit the request timing rather than polling
/// for it, then recomputes the estimate once a second.
pub async fn report_progress(handle: CoordinatorHandle, max_chars: usize) {
    let mut events = handle.subscribe();
    let Ok(timing) = handle.wait_for_timing().await else {
        return;
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let progress = LoadingProgress::at(&timing, Utc::now());
                eprint!("\r{}", loading_line(&progress, max_chars));
            }
            event = events.recv() => match event {
                Ok(Event::Phase(Phase::Completed | Phase::Failed | Phase::Idle))
                | Err(RecvError::Closed) => break,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{Aggregations, SummaryResponse, Violation};
    use ratatui::backend::TestBackend;

    fn rendered(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn sample_view() -> DashboardView {
        let response = SummaryResponse {
            summary: "Your data is shared with advertisers.".to_string(),
            aggregations: Aggregations {
                total_violations: 2,
                high_severity: 1,
                medium_severity: 1,
                low_severity: 0,
            },
            violations: vec![
                Violation {
                    violating_rule: "We sell data".to_string(),
                    actual_rule: "Consent required".to_string(),
                    source: "GDPR".to_string(),
                    severity: Severity::High,
                },
                Violation {
                    violating_rule: "Kept for ever".to_string(),
                    actual_rule: "Storage limit".to_string(),
                    source: "CCPA".to_string(),
                    severity: Severity::Medium,
                },
            ],
        };
        DashboardView::new(&response, "https://www.example.com/privacy")
    }

    #[test]
    fn dashboard_renders_score_summary_and_table() {
        let view = sample_view();
        let mut terminal = Terminal::new(TestBackend::new(100, dashboard_height(&view))).unwrap();
        terminal
            .draw(|frame| {
                let area = frame.area();
                draw_dashboard(frame, area, &view)
            })
            .unwrap();

        let screen = rendered(&terminal);
        assert!(screen.contains("example.com"));
        assert!(screen.contains(&format!("Risk score {} %", view.risk_score)));
        assert!(screen.contains("Your data is shared"));
        assert!(screen.contains("We sell data"));
        assert!(screen.contains("By source"));
    }

    #[test]
    fn error_view_renders_timeout_title() {
        let view = ErrorView::new(Some(60_000), Some(480));
        let mut terminal = Terminal::new(TestBackend::new(80, 16)).unwrap();
        terminal
            .draw(|frame| {
                let area = frame.area();
                draw_error(frame, area, &view)
            })
            .unwrap();

        assert!(rendered(&terminal).contains("Request timed out"));
    }

    #[test]
    fn loading_view_flags_maximum_length() {
        let progress = LoadingProgress {
            document_length: 60_000,
            estimated_secs: 180,
            elapsed_secs: 30,
        };
        let mut terminal = Terminal::new(TestBackend::new(70, 7)).unwrap();
        terminal
            .draw(|frame| {
                let area = frame.area();
                draw_loading(frame, area, &progress, 60_000)
            })
            .unwrap();

        let screen = rendered(&terminal);
        assert!(screen.contains("Document length: 60000 (maximum)"));
        assert!(screen.contains("Estimated time: 150 seconds remaining"));
    }

    #[test]
    fn loading_line_switches_to_timeout_countdown() {
        colored::control::set_override(false);
        let progress = LoadingProgress {
            document_length: 1_000,
            estimated_secs: 15,
            elapsed_secs: 20,
        };
        assert_eq!(
            loading_line(&progress, 60_000),
            "Document length: 1000 | Remaining time until timeout: 460 seconds"
        );
    }
}
