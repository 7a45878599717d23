//! Touch Panel Simulation TUI - Event injection and monitoring
//!
//! Interactive terminal for simulating touchscreen input and watching the
//! kiosk controller's display commands come back.
//!
//! Keyboard shortcuts:
//! - Up/Down: Select door
//! - Enter/t: Touch selected door
//! - x: Touch an off-sequence door (X9)
//! - a: Generic activity
//! - c: Cancel selection
//! - b: Buy via wired panel (TCP "BUY contactless")
//! - s: Run secret sequence scenario
//! - p: Run purchase scenario
//! - o: Run step-timeout scenario
//! - r: Reset log
//! - q: Quit
//!
//! Usage:
//!   cargo run --bin sim -- --mqtt-host localhost --mqtt-port 1883

use chrono::Utc;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use rumqttc::{AsyncClient, Event as MqttEvent, MqttOptions, Packet, QoS};
use serde_json::json;
use std::collections::VecDeque;
use std::io::{self, Write as IoWrite};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const LOG_CAPACITY: usize = 50;
const TOUCH_TOPIC: &str = "kiosk/touch";
const DISPLAY_TOPICS: &str = "kiosk/display/#";

/// Door grid offered for selection (matches the dev backend layout)
const DOORS: [&str; 8] = ["A1", "B2", "C3", "D4", "A2", "B3", "C1", "D2"];

#[derive(Parser, Debug)]
#[command(name = "sim")]
#[command(about = "Touch panel simulation TUI for local testing")]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    mqtt_port: u16,

    /// Wired panel TCP listener port
    #[arg(long, default_value = "25901")]
    panel_port: u16,
}

// ============================================================================
// Event log
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Flow {
    Tx,
    Rx,
}

#[derive(Debug, Clone)]
struct LogEntry {
    at: chrono::DateTime<Utc>,
    dir: Flow,
    text: String,
    color: Color,
}

// ============================================================================
// Scenario runner
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Touch(&'static str),
    BuyTcp(&'static str),
    Activity,
    Wait(u64),
}

#[derive(Debug)]
struct Scenario {
    name: &'static str,
    steps: Vec<Step>,
    cursor: usize,
    sleeping_until: Option<Instant>,
}

impl Scenario {
    /// The secret restock sequence, each touch inside the step window
    fn secret_sequence() -> Self {
        Self::new(
            "Secret Sequence",
            vec![
                Step::Touch("A1"),
                Step::Wait(800),
                Step::Touch("B2"),
                Step::Wait(800),
                Step::Touch("C3"),
                Step::Wait(800),
                Step::Touch("D4"),
            ],
        )
    }

    /// Select a door, then buy it over the wired panel
    fn purchase() -> Self {
        Self::new(
            "Purchase",
            vec![
                Step::Touch("A1"),
                Step::Wait(500),
                Step::BuyTcp("contactless"),
                Step::Wait(2000),
                Step::Activity,
            ],
        )
    }

    /// Blow the per-step window before the last door; must NOT activate
    fn step_timeout() -> Self {
        Self::new(
            "Step Timeout",
            vec![
                Step::Touch("A1"),
                Step::Wait(800),
                Step::Touch("B2"),
                Step::Wait(800),
                Step::Touch("C3"),
                Step::Wait(6500),
                Step::Touch("D4"),
            ],
        )
    }

    fn new(name: &'static str, steps: Vec<Step>) -> Self {
        Self { name, steps, cursor: 0, sleeping_until: None }
    }

    fn done(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    fn describe_current(&self) -> String {
        match self.steps.get(self.cursor) {
            Some(Step::Touch(door)) => format!("Touch {}", door),
            Some(Step::BuyTcp(method)) => format!("Buy ({})", method),
            Some(Step::Activity) => "Activity".to_string(),
            Some(Step::Wait(ms)) => format!("Wait {}ms", ms),
            None => "Complete".to_string(),
        }
    }
}

// ============================================================================
// App state
// ============================================================================

#[derive(Debug)]
struct SimState {
    cursor: usize,
    log: VecDeque<LogEntry>,
    scenario: Option<Scenario>,
    mqtt_connected: bool,
    sent: u64,
    received: u64,
    restocks: u64,
    screensaver_on: Option<bool>,
}

impl SimState {
    fn new() -> Self {
        Self {
            cursor: 0,
            log: VecDeque::new(),
            scenario: None,
            mqtt_connected: false,
            sent: 0,
            received: 0,
            restocks: 0,
            screensaver_on: None,
        }
    }

    fn push_log(&mut self, dir: Flow, text: String, color: Color) {
        self.log.push_back(LogEntry { at: Utc::now(), dir, text, color });
        while self.log.len() > LOG_CAPACITY {
            self.log.pop_front();
        }
        match dir {
            Flow::Tx => self.sent += 1,
            Flow::Rx => self.received += 1,
        }
    }

    fn log_tx(&mut self, text: String) {
        self.push_log(Flow::Tx, text, Color::Cyan);
    }

    fn door_under_cursor(&self) -> &'static str {
        DOORS[self.cursor]
    }
}

// ============================================================================
// Event injection
// ============================================================================

async fn publish_touch_msg(client: &AsyncClient, state: &mut SimState, body: serde_json::Value) {
    let label = body["type"].as_str().unwrap_or("?").to_string();
    let extra = body["door"].as_str().unwrap_or("").to_string();
    if client
        .publish(TOUCH_TOPIC, QoS::AtLeastOnce, false, body.to_string())
        .await
        .is_ok()
    {
        state.log_tx(format!("{} {}", label, extra).trim_end().to_string());
    }
}

async fn send_touch(client: &AsyncClient, state: &mut SimState, door: &str) {
    publish_touch_msg(client, state, json!({"type": "DOOR_TOUCH", "door": door})).await;
}

async fn send_activity(client: &AsyncClient, state: &mut SimState) {
    publish_touch_msg(client, state, json!({"type": "ACTIVITY"})).await;
}

async fn send_cancel(client: &AsyncClient, state: &mut SimState) {
    publish_touch_msg(client, state, json!({"type": "CANCEL"})).await;
}

/// Buy via the wired panel line protocol (exercises the TCP listener)
fn send_buy_tcp(state: &mut SimState, method: &str, panel_port: u16) {
    match TcpStream::connect(("127.0.0.1", panel_port)) {
        Ok(mut stream) => {
            if stream.write_all(format!("BUY {}\n", method).as_bytes()).is_ok() {
                state.log_tx(format!("BUY {} (tcp)", method));
            }
        }
        Err(_) => {
            state.log_tx("BUY failed (connection refused)".to_string());
        }
    }
}

/// Advance the running scenario by at most one step
async fn drive_scenario(client: &AsyncClient, state: &mut SimState, panel_port: u16) {
    let next = {
        let Some(scenario) = state.scenario.as_mut() else { return };

        if let Some(until) = scenario.sleeping_until {
            if Instant::now() < until {
                return;
            }
            scenario.sleeping_until = None;
            scenario.cursor += 1;
        }

        if scenario.done() {
            let name = scenario.name;
            state.scenario = None;
            state.log_tx(format!("Scenario '{}' complete!", name));
            return;
        }
        scenario.steps[scenario.cursor].clone()
    };

    match next {
        Step::Touch(door) => send_touch(client, state, door).await,
        Step::BuyTcp(method) => send_buy_tcp(state, method, panel_port),
        Step::Activity => send_activity(client, state).await,
        Step::Wait(ms) => {
            if let Some(s) = state.scenario.as_mut() {
                s.sleeping_until = Some(Instant::now() + Duration::from_millis(ms));
            }
            return; // cursor advances when the sleep ends
        }
    }
    if let Some(s) = state.scenario.as_mut() {
        s.cursor += 1;
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render(f: &mut Frame, state: &SimState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(12),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_status(f, rows[0], state);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);
    render_doors(f, columns[0], state);
    render_scenario(f, columns[1], state);

    render_log(f, rows[2], state);

    let help = Paragraph::new(
        "Enter/t=touch  x=off-sequence  a=activity  c=cancel  b=buy  s/p/o=scenario  r=reset  q=quit",
    )
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, rows[3]);
}

fn render_status(f: &mut Frame, area: Rect, state: &SimState) {
    let mqtt = if state.mqtt_connected {
        Span::styled("MQTT: ✓", Style::default().fg(Color::Green))
    } else {
        Span::styled("MQTT: ✗", Style::default().fg(Color::Red))
    };
    let saver = match state.screensaver_on {
        Some(true) => Span::styled("  Screensaver: ON  ", Style::default().fg(Color::Magenta)),
        Some(false) => Span::raw("  Screensaver: off  "),
        None => Span::raw("  Screensaver: ?  "),
    };
    let counters = Span::raw(format!("Sent: {}  Recv: {}  ", state.sent, state.received));
    let restocks = Span::styled(
        format!("Restocks: {}", state.restocks),
        Style::default().fg(Color::Yellow),
    );

    let header = Paragraph::new(Line::from(vec![mqtt, saver, counters, restocks])).block(
        Block::default()
            .title(" Touch Panel Simulation TUI ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn render_doors(f: &mut Frame, area: Rect, state: &SimState) {
    let items: Vec<ListItem> = DOORS
        .iter()
        .enumerate()
        .map(|(idx, door)| {
            if state.cursor == idx {
                ListItem::new(format!("▸ {}", door))
                    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            } else {
                ListItem::new(format!("  {}", door))
            }
        })
        .collect();

    f.render_widget(
        List::new(items).block(
            Block::default()
                .title(" Doors (↑↓ select, Enter=touch) ")
                .borders(Borders::ALL),
        ),
        area,
    );
}

fn render_scenario(f: &mut Frame, area: Rect, state: &SimState) {
    let lines = match &state.scenario {
        Some(scenario) => {
            let filled = (scenario.cursor * 20) / scenario.steps.len().max(1);
            vec![
                Line::from(Span::styled(
                    format!("Running: {}", scenario.name),
                    Style::default().fg(Color::Green),
                )),
                Line::from(""),
                Line::from(format!(
                    "Step {}/{}: {}",
                    scenario.cursor + 1,
                    scenario.steps.len(),
                    scenario.describe_current()
                )),
                Line::from(format!("[{}{}]", "█".repeat(filled), "░".repeat(20 - filled))),
            ]
        }
        None => vec![
            Line::from("No scenario running"),
            Line::from(""),
            Line::from(Span::styled("s = Secret Sequence", Style::default().fg(Color::Cyan))),
            Line::from(Span::styled("p = Purchase", Style::default().fg(Color::Cyan))),
            Line::from(Span::styled("o = Step Timeout", Style::default().fg(Color::Cyan))),
        ],
    };

    f.render_widget(
        Paragraph::new(lines).block(Block::default().title(" Scenarios ").borders(Borders::ALL)),
        area,
    );
}

fn render_log(f: &mut Frame, area: Rect, state: &SimState) {
    let items: Vec<ListItem> = state
        .log
        .iter()
        .rev()
        .take(10)
        .map(|entry| {
            let arrow = match entry.dir {
                Flow::Tx => "→",
                Flow::Rx => "←",
            };
            ListItem::new(format!("{} {} {}", entry.at.format("%H:%M:%S%.3f"), arrow, entry.text))
                .style(Style::default().fg(entry.color))
        })
        .collect();

    f.render_widget(
        List::new(items).block(Block::default().title(" Event Log ").borders(Borders::ALL)),
        area,
    );
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut mqtt_options = MqttOptions::new("sim-tui", &args.mqtt_host, args.mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);
    client.subscribe(DISPLAY_TOPICS, QoS::AtLeastOnce).await?;

    let state = Arc::new(Mutex::new(SimState::new()));

    // Tail the display topics into the log ring
    let mqtt_state = state.clone();
    let mqtt_handle = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                    mqtt_state.lock().await.mqtt_connected = true;
                }
                Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                    let Ok(payload) = std::str::from_utf8(&publish.payload) else { continue };
                    let topic = publish.topic.as_str();
                    let mut state = mqtt_state.lock().await;

                    let color = if topic.ends_with("restock") {
                        state.restocks += 1;
                        Color::Yellow
                    } else if topic.ends_with("screensaver") {
                        state.screensaver_on = Some(payload.contains("\"on\":true"));
                        Color::Magenta
                    } else if topic.ends_with("selection") {
                        Color::Green
                    } else if topic.ends_with("results") {
                        Color::LightBlue
                    } else {
                        Color::White
                    };

                    let text = if payload.len() > 80 {
                        format!("{}: {}...", topic, &payload[..77])
                    } else {
                        format!("{}: {}", topic, payload)
                    };
                    state.push_log(Flow::Rx, text, color);
                }
                Ok(_) => {}
                Err(e) => {
                    let mut state = mqtt_state.lock().await;
                    state.mqtt_connected = false;
                    state.push_log(Flow::Rx, format!("MQTT error: {}", e), Color::Red);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let tick_rate = Duration::from_millis(50);
    let mut last_tick = Instant::now();

    loop {
        {
            let state = state.lock().await;
            terminal.draw(|f| render(f, &state))?;
        }

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let mut state = state.lock().await;

                    match key.code {
                        KeyCode::Char('q') => break,
                        KeyCode::Up => {
                            state.cursor = state.cursor.checked_sub(1).unwrap_or(DOORS.len() - 1);
                        }
                        KeyCode::Down => {
                            state.cursor = (state.cursor + 1) % DOORS.len();
                        }
                        KeyCode::Enter | KeyCode::Char('t') => {
                            let door = state.door_under_cursor();
                            send_touch(&client, &mut state, door).await;
                        }
                        KeyCode::Char('x') => {
                            send_touch(&client, &mut state, "X9").await;
                        }
                        KeyCode::Char('a') => {
                            send_activity(&client, &mut state).await;
                        }
                        KeyCode::Char('c') => {
                            send_cancel(&client, &mut state).await;
                        }
                        KeyCode::Char('b') => {
                            send_buy_tcp(&mut state, "contactless", args.panel_port);
                        }
                        KeyCode::Char('s') => {
                            state.scenario = Some(Scenario::secret_sequence());
                            state.log_tx("Starting Secret Sequence scenario".to_string());
                        }
                        KeyCode::Char('p') => {
                            state.scenario = Some(Scenario::purchase());
                            state.log_tx("Starting Purchase scenario".to_string());
                        }
                        KeyCode::Char('o') => {
                            state.scenario = Some(Scenario::step_timeout());
                            state.log_tx("Starting Step Timeout scenario".to_string());
                        }
                        KeyCode::Char('r') => {
                            state.log.clear();
                            state.scenario = None;
                            state.log_tx("Simulation reset".to_string());
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            let mut state = state.lock().await;
            drive_scenario(&client, &mut state, args.panel_port).await;
            last_tick = Instant::now();
        }
    }

    mqtt_handle.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    Ok(())
}
