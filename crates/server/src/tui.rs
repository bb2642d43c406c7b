use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use ember::{PeerInfo, ServerEvent};
use log::Level;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::events;

const MAX_LOG_LINES: usize = 500;

struct LogLine {
    level: Level,
    at: Instant,
    text: String,
}

pub struct TuiState {
    started: Instant,
    local_addr: SocketAddr,
    log: VecDeque<LogLine>,
    scroll: usize,
    requests: u64,
    changes: u64,
}

impl TuiState {
    pub fn new(local_addr: SocketAddr) -> Self {
        Self {
            started: Instant::now(),
            local_addr,
            log: VecDeque::new(),
            scroll: 0,
            requests: 0,
            changes: 0,
        }
    }

    pub fn record(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::RequestReceived { .. } => {
                self.requests += 1;
                return;
            }
            ServerEvent::ValueChanged { .. }
            | ServerEvent::MatrixChanged { .. }
            | ServerEvent::MatrixConnect { .. }
            | ServerEvent::MatrixDisconnect { .. } => self.changes += 1,
            _ => {}
        }
        let (level, text) = events::describe(event);
        self.push(level, text);
    }

    pub fn log_info(&mut self, text: impl Into<String>) {
        self.push(Level::Info, text.into());
    }

    fn push(&mut self, level: Level, text: String) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(LogLine {
            level,
            at: Instant::now(),
            text,
        });
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 5).min(self.log.len());
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(5);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, peers: &[PeerInfo], element_count: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(peers.len().clamp(1, 8) as u16 + 2),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], state, peers.len(), element_count);
    render_peers(frame, chunks[1], peers);
    render_log(frame, chunks[2], state);
    render_help(frame, chunks[3]);
}

fn render_header(
    frame: &mut Frame,
    area: Rect,
    state: &TuiState,
    peer_count: usize,
    element_count: usize,
) {
    let uptime = format_duration(state.started.elapsed().as_secs());
    let title = format!(" Ember+ Server {} - Uptime: {} ", state.local_addr, uptime);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Peers: {}  |  Elements: {}  |  Requests: {}  |  Changes: {}",
        peer_count, element_count, state.requests, state.changes
    );

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_peers(frame: &mut Frame, area: Rect, peers: &[PeerInfo]) {
    let block = Block::default()
        .title(" Peers ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let lines: Vec<Line> = if peers.is_empty() {
        vec![Line::styled(
            "No peers connected",
            Style::default().fg(Color::DarkGray),
        )]
    } else {
        peers
            .iter()
            .map(|peer| {
                Line::from(vec![
                    Span::styled(
                        format!("{:<10}", peer.id.to_string()),
                        Style::default().fg(Color::Gray),
                    ),
                    Span::styled(
                        format!("{:<24}", peer.addr.to_string()),
                        Style::default().fg(Color::White),
                    ),
                    Span::styled(
                        format_duration(peer.connected_at.elapsed().as_secs()),
                        Style::default().fg(Color::Gray),
                    ),
                ])
            })
            .collect()
    };

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let visible = area.height.saturating_sub(2) as usize;
    let end = state.log.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = state
        .log
        .range(start..end)
        .map(|line| {
            let color = match line.level {
                Level::Error => Color::Red,
                Level::Warn => Color::Yellow,
                Level::Info => Color::White,
                Level::Debug | Level::Trace => Color::Gray,
            };
            let age = state.started.elapsed().saturating_sub(line.at.elapsed());
            Line::from(vec![
                Span::styled(
                    format!("{} ", format_duration(age.as_secs())),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(line.text.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new("q/ESC quit  |  PgUp/PgDn scroll  |  End follow")
        .block(block)
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );

    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}
