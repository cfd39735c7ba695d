use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use lazytree::{
    ControllerEvent, DisplayId, Expansion, InitialPayload, InteractionController, Session,
    SourceConfig, SourceTree, TreeConfig, VisibleNode,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect as UiRect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_DEEP_DEPTH: usize = 3;

/// Browse a lazily fetched tree in the terminal.
#[derive(Parser)]
#[command(name = "lazytree-tui", version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial payload JSON (required for live sources)
    #[arg(short, long)]
    payload: Option<PathBuf>,

    /// Write logs here (the terminal is owned by the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Default, Clone, Copy)]
struct UiLayoutState {
    tree_inner_area: Option<UiRect>,
}

struct App {
    controller: InteractionController,
    rows: Vec<VisibleNode>,
    selected: usize,
    scroll: usize,
    status: String,
    revealed_at: HashMap<DisplayId, Instant>,
    ui_layout: UiLayoutState,
    should_quit: bool,
}

impl App {
    fn new(controller: InteractionController) -> Self {
        let rows = controller.display().visible_nodes();
        Self {
            controller,
            rows,
            selected: 0,
            scroll: 0,
            status: String::from("Enter/click: expand or collapse   q: quit"),
            revealed_at: HashMap::new(),
            ui_layout: UiLayoutState::default(),
            should_quit: false,
        }
    }

    fn selected_node(&self) -> Option<DisplayId> {
        self.rows.get(self.selected).map(|row| row.display)
    }

    fn refresh_rows(&mut self) {
        let current = self.selected_node();
        self.rows = self.controller.display().visible_nodes();
        self.selected = current
            .and_then(|id| self.rows.iter().position(|row| row.display == id))
            .unwrap_or_else(|| self.selected.min(self.rows.len().saturating_sub(1)));
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let events = self.controller.tick(now);
        for event in events {
            self.on_controller_event(event, now);
        }
        let fade = self.controller.session().transition_duration();
        self.revealed_at.retain(|_, at| now.duration_since(*at) < fade);
        self.refresh_rows();
    }

    fn on_controller_event(&mut self, event: ControllerEvent, now: Instant) {
        match event {
            ControllerEvent::Revealed { node, displays } => {
                let label = self.controller.store().label(node).unwrap_or("?").to_string();
                self.status = format!("Loaded children of {label}");
                for display in displays {
                    for child in self.controller.display().visible_children(display) {
                        self.revealed_at.insert(child, now);
                    }
                }
            }
            ControllerEvent::FetchFailed { node, error } => {
                self.status = format!("Fetch of {node} failed: {error} (retry to try again)");
            }
            ControllerEvent::MergeRejected { node, error } => {
                self.status = format!("Bad data for {node}: {error}");
            }
            ControllerEvent::DeepRevealFinished { .. } => {
                self.status = String::from("Deep reveal finished");
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.rows.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.press_selected(),
            KeyCode::Char('e') => self.run(|c, id| c.reveal(id)),
            KeyCode::Char('c') => self.run(|c, id| c.collapse(id)),
            KeyCode::Char('d') => {
                let depth = match self.controller.policy() {
                    lazytree::ClickPolicy::Deep { depth, .. } => depth,
                    lazytree::ClickPolicy::Toggle => DEFAULT_DEEP_DEPTH,
                };
                self.run(move |c, id| c.reveal_depth(id, depth));
            }
            _ => {}
        }
    }

    fn on_mouse(&mut self, event: MouseEvent) {
        if let MouseEventKind::Down(MouseButton::Left) = event.kind {
            let Some(area) = self.ui_layout.tree_inner_area else {
                return;
            };
            if !point_in_rect(area, event.column, event.row) {
                return;
            }
            let index = self.scroll + (event.row - area.y) as usize;
            if index < self.rows.len() {
                self.selected = index;
                self.press_selected();
            }
            return;
        }

        match event.kind {
            MouseEventKind::ScrollUp => self.selected = self.selected.saturating_sub(1),
            MouseEventKind::ScrollDown => {
                if self.selected + 1 < self.rows.len() {
                    self.selected += 1;
                }
            }
            _ => {}
        }
    }

    fn press_selected(&mut self) {
        let Some(id) = self.selected_node() else {
            return;
        };
        if let Err(err) = self.controller.press(id, Instant::now()) {
            self.status = format!("Click failed: {err}");
        }
        self.refresh_rows();
    }

    fn run<F>(&mut self, action: F)
    where
        F: FnOnce(&mut InteractionController, DisplayId) -> lazytree::Result<lazytree::Transition>,
    {
        let Some(id) = self.selected_node() else {
            return;
        };
        match action(&mut self.controller, id) {
            Ok(transition) => tracing::debug!(?transition, "key action"),
            Err(err) => self.status = format!("Action failed: {err}"),
        }
        self.refresh_rows();
    }

    fn marker(&self, row: &VisibleNode) -> (&'static str, Color) {
        let store = self.controller.store();
        match row.expansion {
            Expansion::Expanded if store.children(row.data_id).is_some_and(|c| c.is_empty()) => {
                ("·", Color::Gray)
            }
            Expansion::Expanded => ("▾", Color::White),
            Expansion::Collapsed => ("▸", Color::LightBlue),
            Expansion::Unrevealed if self.controller.is_pending(row.data_id) => ("…", Color::Yellow),
            Expansion::Unrevealed if store.children(row.data_id).is_some_and(|c| c.is_empty()) => {
                ("·", Color::Gray)
            }
            Expansion::Unrevealed => ("+", Color::Green),
        }
    }
}

fn point_in_rect(rect: UiRect, x: u16, y: u16) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

fn draw_ui(frame: &mut Frame, app: &mut App) {
    let root = frame.area();
    let split = Layout::horizontal([Constraint::Length(42), Constraint::Min(30)]).split(root);
    let left = split[0];
    let right = split[1];

    let left_block = Block::default()
        .title(" lazytree ")
        .borders(Borders::ALL);
    let left_inner = left_block.inner(left);
    frame.render_widget(left_block, left);

    let left_rows = Layout::vertical([
        Constraint::Length(6),
        Constraint::Min(8),
        Constraint::Length(5),
    ])
    .split(left_inner);

    let store = app.controller.store();
    let status = Paragraph::new(vec![
        Line::from(app.status.clone()),
        Line::from(format!(
            "known: {}  frontier: {}  in flight: {}",
            store.len(),
            store.frontier_len(),
            app.controller.pending_fetches()
        )),
    ])
    .block(Block::default().title(" Status ").borders(Borders::ALL));
    frame.render_widget(status, left_rows[0]);

    let mut selected_lines = Vec::new();
    if let Some(row) = app.rows.get(app.selected) {
        let presentation = store.presentation(row.data_id);
        selected_lines.push(Line::from(vec![
            Span::styled("Node: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{} {}",
                row.data_id,
                presentation.map(|p| p.label.as_str()).unwrap_or("?")
            )),
        ]));
        if let Some(tooltip) = presentation.and_then(|p| p.tooltip.as_deref()) {
            selected_lines.push(Line::from(vec![
                Span::styled("Tooltip: ", Style::default().fg(Color::Gray)),
                Span::raw(tooltip.to_string()),
            ]));
        }
        selected_lines.push(Line::from(vec![
            Span::styled("State: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:?}", row.expansion)),
            Span::raw(if store.is_frontier(row.data_id) {
                "  (children not loaded)"
            } else {
                ""
            }),
        ]));
    } else {
        selected_lines.push(Line::from("Selected: (none)"));
    }
    frame.render_widget(
        Paragraph::new(selected_lines)
            .block(Block::default().title(" Selection ").borders(Borders::ALL)),
        left_rows[1],
    );

    let help_lines = vec![
        Line::from("Enter/click: gesture   j/k: move"),
        Line::from("e: reveal  c: collapse  d: deep"),
        Line::from("q: quit"),
    ];
    frame.render_widget(
        Paragraph::new(help_lines).block(Block::default().title(" Controls ").borders(Borders::ALL)),
        left_rows[2],
    );

    let tree_block = Block::default().title(" Tree ").borders(Borders::ALL);
    let tree_inner = tree_block.inner(right);
    frame.render_widget(tree_block, right);
    app.ui_layout.tree_inner_area = Some(tree_inner);

    let height = tree_inner.height as usize;
    if app.selected < app.scroll {
        app.scroll = app.selected;
    } else if height > 0 && app.selected >= app.scroll + height {
        app.scroll = app.selected + 1 - height;
    }

    let lines: Vec<Line> = app
        .rows
        .iter()
        .enumerate()
        .skip(app.scroll)
        .take(height)
        .map(|(index, row)| {
            let (marker, color) = app.marker(row);
            let label = app.controller.store().label(row.data_id).unwrap_or("?");
            let mut style = Style::default();
            if app.revealed_at.contains_key(&row.display) {
                style = style.add_modifier(Modifier::BOLD);
            }
            if index == app.selected {
                style = style.bg(Color::Rgb(60, 60, 70));
            }
            Line::from(vec![
                Span::raw("  ".repeat(row.depth)),
                Span::styled(format!("{marker} "), Style::default().fg(color)),
                Span::styled(label.to_string(), style),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), tree_inner);
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, mut app: App) -> io::Result<()> {
    loop {
        app.tick();

        terminal.draw(|frame| {
            draw_ui(frame, &mut app);
        })?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Mouse(mouse) => app.on_mouse(mouse),
                Event::Resize(_, _) => {}
                Event::FocusGained | Event::FocusLost | Event::Paste(_) => {}
            }
        }
    }

    Ok(())
}

fn init_logging(log_file: Option<&PathBuf>) -> io::Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_payload(cli: &Cli, config: &TreeConfig) -> Result<InitialPayload, Box<dyn std::error::Error>> {
    if let Some(path) = cli.payload.as_ref() {
        return Ok(InitialPayload::from_json(&std::fs::read_to_string(path)?)?);
    }
    match &config.source {
        SourceConfig::Mock {
            branching, depth, ..
        } => Ok(SourceTree::generate(*branching, *depth).initial_payload(config.root_id, 1)),
        SourceConfig::Live { .. } => Err("a live source needs --payload".into()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let config = match cli.config.as_ref() {
        Some(path) => TreeConfig::load(path)?,
        None => TreeConfig::default(),
    };
    let payload = load_payload(&cli, &config)?;
    let session = Session::start(&payload, &config)?;
    let controller = InteractionController::new(session, config.build_fetcher()?, &config);

    enable_raw_mode()?;
    crossterm::execute!(stdout(), EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let app_result = run_app(&mut terminal, App::new(controller));

    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(app_result?)
}
