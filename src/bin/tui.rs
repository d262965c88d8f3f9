use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use multicell_exchange::{
    BackoffPolicy, BufferConfig, CountingSink, MultiCellBuffer, ParkingAgent, ParkingStructure,
    PriceBoard, RandomPricing,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::{io, time::Duration};

const AGENTS: usize = 5;
const CELLS: usize = 3;
const PRICE_HISTORY: usize = 15;

// Helper to render one line per cell
fn render_cells(cells: &[Option<i64>], fills: &[u64]) -> String {
    let mut out = String::new();
    let max_fills = fills.iter().copied().max().unwrap_or(1).max(1) as f32;

    for (i, cell) in cells.iter().enumerate() {
        let content = match cell {
            Some(id) => format!("order {:<6}", id),
            None => "empty       ".to_string(),
        };
        let fill_count = fills.get(i).copied().unwrap_or(0);
        // Usage bar, 20 chars max
        let bar_len = ((fill_count as f32 / max_fills) * 20.0) as usize;
        out.push_str(&format!("[{}] {} {} {}\n", i, content, "█".repeat(bar_len), fill_count));
    }
    out
}

fn render_prices(prices: &VecDeque<Decimal>) -> String {
    let mut out = String::new();
    for price in prices.iter().rev() {
        // 40.00 is the top of the pricing range
        let bar_len = (price.to_f32().unwrap_or(0.0) / 40.0 * 20.0) as usize;
        out.push_str(&format!("{:>7.2} {}\n", price, "█".repeat(bar_len)));
    }
    out
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Shared state
    let buffer = Arc::new(MultiCellBuffer::with_config(BufferConfig {
        cells: CELLS,
        backoff: BackoffPolicy::constant(Duration::from_millis(200)),
        ..BufferConfig::default()
    })?);
    let board = PriceBoard::new();
    let sink = Arc::new(CountingSink::new());
    let feed = board.subscribe();

    // Agents and one structure running flat out; the demo never reaches the bound.
    for i in 0..AGENTS {
        let agent = ParkingAgent::new(
            format!("Agent-{}", i + 1),
            buffer.clone(),
            board.subscribe(),
            Duration::from_millis(500),
        );
        thread::spawn(move || agent.run());
    }
    let structure = ParkingStructure::new(
        "Structure-1",
        buffer.clone(),
        board.publisher(),
        RandomPricing::new(),
        sink.clone(),
    )
    .with_price_drops(u32::MAX)
    .with_cycle_interval(Duration::from_millis(100));
    thread::spawn(move || structure.run());

    // Run TUI Loop
    let mut prices: VecDeque<Decimal> = VecDeque::with_capacity(PRICE_HISTORY);

    loop {
        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') {
                    break;
                }
            }
        }

        if let Some(n) = feed.wait(Duration::ZERO) {
            if prices.len() == PRICE_HISTORY {
                prices.pop_front();
            }
            prices.push_back(n.price);
        }

        let snapshot = buffer.snapshot();
        let stats = buffer.stats();
        let receipts = sink.total();

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(1)
                .constraints(
                    [
                        Constraint::Length(3),  // Header
                        Constraint::Min(10),    // Cells + prices
                        Constraint::Length(10), // Stats
                    ]
                    .as_ref(),
                )
                .split(f.size());

            // 1. Header
            let header = Block::default().borders(Borders::ALL).title("MULTICELL Parking Exchange");
            let title = Paragraph::new(format!("{} agents | {} cells | Press 'q' to quit", AGENTS, CELLS))
                .block(header)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Cyan));
            f.render_widget(title, chunks[0]);

            // 2. Cells and price feed
            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(chunks[1]);

            let cells_widget = Paragraph::new(render_cells(&snapshot, &stats.fills)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("CELLS")
                    .style(Style::default().fg(Color::Green)),
            );
            let prices_widget = Paragraph::new(render_prices(&prices)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("PRICE DROPS")
                    .style(Style::default().fg(Color::Red)),
            );
            f.render_widget(cells_widget, body[0]);
            f.render_widget(prices_widget, body[1]);

            // 3. Stats
            let stats_text = format!(
                "Puts: {} (failed {})\nTakes: {} (empty {})\nGate timeouts: {}\nLost races: {}\nReceipts: {}",
                stats.puts,
                stats.put_failures,
                stats.takes,
                stats.empty_takes,
                stats.gate_timeouts,
                stats.lost_races,
                receipts
            );
            let stats_block = Paragraph::new(stats_text)
                .block(Block::default().borders(Borders::ALL).title("Buffer Telemetry"))
                .style(Style::default().fg(Color::Yellow));
            f.render_widget(stats_block, chunks[2]);
        })?;
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    Ok(())
}
