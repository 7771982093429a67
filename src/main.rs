use anyhow::{Context, Result as AnyhowResult};
use clap::{Parser, ValueEnum};
use crossterm::event::{poll as event_poll, read as event_read, Event as CrosstermEvent};
use crossterm::{terminal::SetTitle, QueueableCommand};
use serial_console::adapter::{ConsoleAdapter, EmulatorBridge, RecordingAdapter, TerminalEmulator};
use serial_console::config::Config;
use serial_console::input::host_events::{self, HostAction};
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use serial_console::model::bus::{self, Bus, SerialInput};
use serial_console::services::channel_port::ChannelPort;
use serial_console::services::event_loop::EventLoop;
use serial_console::services::focus::FocusCoordinator;
use serial_console::services::terminal_modes::{self, TerminalModes};
use serial_console::services::time_source::RealTimeSource;
use serial_console::services::tracing_setup;
use serial_console::view::TerminalSink;
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Read, Stdout, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Longest wait for host input before checking the device again.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Longest stretch spent forwarding device output before drawing and
/// polling host input again.
const FRAME_DURATION: Duration = Duration::from_millis(16);

/// Chunks read ahead of the console; the reader thread blocks beyond this.
const DEVICE_QUEUE: usize = 64;

/// Attach a terminal console to a serial byte stream
#[derive(Parser, Debug)]
#[command(name = "serial-console")]
#[command(about = "Throttled serial console for a child process or byte stream", long_about = None)]
#[command(version)]
struct Args {
    /// Program to run on a pseudo-terminal acting as the serial line
    #[arg(long, value_name = "CMD", conflicts_with = "input")]
    command: Option<String>,

    /// Arguments for --command, after `--`
    #[arg(last = true, value_name = "ARGS")]
    args: Vec<String>,

    /// Read serial output from a file or FIFO instead of a program
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// How device output is presented
    #[arg(long, value_enum, default_value_t = Mode::Textbox)]
    mode: Mode,

    /// Start with keyboard input to the device disabled
    #[arg(long)]
    no_input: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file for diagnostics (default: system temp dir)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Write a raw transcript of device output to this file on exit
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Print the configuration JSON Schema and exit
    #[arg(long)]
    dump_schema: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Buffered text-box console with a status line
    Textbox,
    /// Pass the stream straight to the host terminal
    Raw,
}

enum DeviceEvent {
    Bytes(Vec<u8>),
    Closed,
}

type DeviceChild = Box<dyn portable_pty::Child + Send + Sync>;
type DeviceWriter = Box<dyn Write + Send>;

/// The far end of the serial line.
struct Device {
    label: String,
    child: Option<DeviceChild>,
    master: Option<Box<dyn MasterPty + Send>>,
    writer: Option<DeviceWriter>,
    events: Receiver<DeviceEvent>,
    open: bool,
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl Device {
    /// Run `command` on a new pseudo-terminal of `cols` x `rows`.
    fn spawn(command: &str, args: &[String], (cols, rows): (u16, u16)) -> AnyhowResult<Self> {
        let pair = native_pty_system()
            .openpty(pty_size(cols, rows))
            .context("Failed to open pseudo-terminal")?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to start {}", command))?;
        // Only the child holds the slave side, so its exit ends our reads.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to read from pseudo-terminal")?;
        let writer = pair
            .master
            .take_writer()
            .context("Failed to write to pseudo-terminal")?;
        tracing::info!(
            "Device started: {} (pid {:?}, {}x{})",
            command,
            child.process_id(),
            cols,
            rows
        );

        Ok(Self {
            label: command.to_string(),
            events: spawn_reader(reader),
            child: Some(child),
            master: Some(pair.master),
            writer: Some(writer),
            open: true,
        })
    }

    fn open_file(path: &Path) -> AnyhowResult<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open input {}", path.display()))?;
        tracing::info!("Device input: {}", path.display());
        Ok(Self {
            label: path.display().to_string(),
            events: spawn_reader(file),
            child: None,
            master: None,
            writer: None,
            open: true,
        })
    }

    /// Follow the host terminal size. No-op for file input.
    fn resize(&self, cols: u16, rows: u16) {
        let Some(master) = &self.master else {
            return;
        };
        match master.resize(pty_size(cols, rows)) {
            Ok(()) => tracing::debug!("Device resized to {}x{}", cols, rows),
            Err(e) => tracing::warn!("Failed to resize pseudo-terminal: {}", e),
        }
    }

    fn shutdown(&mut self) {
        self.writer = None;
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    tracing::warn!("Failed to stop device process: {}", e);
                }
            }
            match child.wait() {
                Ok(status) => tracing::info!("Device exited: {:?}", status),
                Err(e) => tracing::warn!("Failed to wait for device process: {}", e),
            }
        }
        self.master = None;
    }
}

/// Read the device on its own thread; bytes arrive in order on the channel.
///
/// The channel is bounded, so a device that outpaces the console blocks in
/// its reader instead of queueing without limit.
fn spawn_reader(mut source: impl Read + Send + 'static) -> Receiver<DeviceEvent> {
    let (tx, rx) = mpsc::sync_channel(DEVICE_QUEUE);
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(DeviceEvent::Bytes(buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // A pty reports EIO once the child has gone.
                    tracing::debug!("Device read ended: {}", e);
                    break;
                }
            }
        }
        let _ = tx.send(DeviceEvent::Closed);
    });
    rx
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    /// Nothing left in the queue.
    Idle,
    /// Time ran out with output still queued.
    Backlog,
    /// The device closed.
    Closed,
}

/// Forward queued device bytes until the queue is empty or `deadline` passes.
///
/// One chunk is always taken, so output keeps moving however late we are.
fn drain_device(
    events: &Receiver<DeviceEvent>,
    deadline: Instant,
    mut push: impl FnMut(u8),
) -> Drain {
    let mut taken = 0usize;
    loop {
        if taken > 0 && Instant::now() >= deadline {
            return Drain::Backlog;
        }
        match events.try_recv() {
            Ok(DeviceEvent::Bytes(bytes)) => {
                bytes.into_iter().for_each(&mut push);
                taken += 1;
            }
            Ok(DeviceEvent::Closed) | Err(TryRecvError::Disconnected) => return Drain::Closed,
            Err(TryRecvError::Empty) => return Drain::Idle,
        }
    }
}

/// Host terminal used directly as the emulator in raw mode.
struct HostTerminal {
    out: BufWriter<Stdout>,
}

impl HostTerminal {
    fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!("Failed to flush terminal: {}", e);
        }
    }
}

impl TerminalEmulator for HostTerminal {
    fn print(&mut self, text: &str) {
        // Device chars stand for single bytes; write those bytes back out.
        if let Err(e) = self.out.write_all(&bus::wire_bytes(text)) {
            tracing::warn!("Failed to write to terminal: {}", e);
        }
    }

    fn decorate(&mut self) {
        if let Err(e) = self.out.queue(SetTitle("serial-console")) {
            tracing::debug!("Failed to set terminal title: {}", e);
        }
        self.flush();
    }
}

enum Ui {
    Textbox {
        console: ConsoleAdapter<TerminalSink<Stdout>>,
        focus: Rc<FocusCoordinator>,
    },
    Raw(EmulatorBridge<HostTerminal>),
}

impl Ui {
    /// Whether device output can be shown yet.
    fn accepts_output(&self) -> bool {
        match self {
            Ui::Textbox { .. } => true,
            Ui::Raw(bridge) => bridge.is_ready(),
        }
    }
}

fn load_config(args: &Args) -> AnyhowResult<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if args.no_input {
        config.console.input_enabled = false;
    }
    Ok(config)
}

fn open_device(args: &Args, size: (u16, u16)) -> AnyhowResult<Device> {
    match (&args.command, &args.input) {
        (Some(command), _) => Device::spawn(command, &args.args, size),
        (None, Some(path)) => Device::open_file(path),
        (None, None) => anyhow::bail!("Either --command or --input is required"),
    }
}

/// Route device-bound input to the pseudo-terminal.
fn connect_input(port: &ChannelPort, writer: Option<DeviceWriter>) {
    let writer = Rc::new(RefCell::new(writer));
    port.on_input(move |input: &SerialInput| {
        let mut writer = writer.borrow_mut();
        let Some(pipe) = writer.as_mut() else {
            tracing::debug!("Input discarded, device has no input: {:?}", input);
            return;
        };
        let result = pipe.write_all(&input.to_bytes()).and_then(|_| pipe.flush());
        if let Err(e) = result {
            tracing::warn!("Device input closed: {}", e);
            *writer = None;
        }
    });
}

fn status_line(device: &Device, console: &ConsoleAdapter<TerminalSink<Stdout>>) -> String {
    format!(
        " {} | {} | input {} | Ctrl+] quit  F2 toggle input",
        device.label,
        if device.open { "connected" } else { "closed" },
        if console.input_enabled() { "on" } else { "off" },
    )
}

fn handle_textbox_event(
    console: &mut ConsoleAdapter<TerminalSink<Stdout>>,
    focus: &FocusCoordinator,
    event: CrosstermEvent,
) -> bool {
    match host_events::translate(&event) {
        HostAction::Quit => return false,
        HostAction::ToggleInput => {
            let enabled = !console.input_enabled();
            console.set_input_enabled(enabled);
        }
        HostAction::Surface(mut surface_event) => {
            if console.has_focus() {
                console.dispatch(&mut surface_event);
            }
        }
        HostAction::PointerDown { row, .. } => {
            let target = console
                .with_sink(|sink| sink.contains_row(row))
                .then(|| console.surface_id());
            focus.pointer_down(target);
            if target.is_some() {
                console.with_sink_mut(|sink| sink.focus());
            }
        }
        HostAction::Scroll(delta) => console.with_sink_mut(|sink| sink.scroll_by(delta)),
        HostAction::Resize { width, height } => {
            console.with_sink_mut(|sink| sink.resize(width, height))
        }
        HostAction::FocusLost => {
            focus.pointer_down(None);
        }
        HostAction::FocusGained => console.with_sink_mut(|sink| sink.focus()),
        HostAction::Ignore => {}
    }
    true
}

fn handle_raw_event(bridge: &EmulatorBridge<HostTerminal>, event: CrosstermEvent) -> bool {
    if host_events::is_quit_key(&event) {
        return false;
    }
    match event {
        CrosstermEvent::Key(key) => {
            if let Some(keys) = host_events::encode_keystroke(&key) {
                bridge.on_keystroke(&keys);
            }
        }
        CrosstermEvent::Paste(text) => {
            bridge.send_string(&text);
        }
        _ => {}
    }
    true
}

fn run_event_loop(
    ui: &mut Ui,
    device: &mut Device,
    port: &ChannelPort,
    event_loop: &EventLoop,
) -> AnyhowResult<()> {
    loop {
        let mut backlog = false;
        if device.open && ui.accepts_output() {
            let deadline = Instant::now() + FRAME_DURATION;
            match drain_device(&device.events, deadline, |byte| {
                port.push_output(char::from(byte))
            }) {
                Drain::Idle => {}
                Drain::Backlog => backlog = true,
                Drain::Closed => {
                    tracing::info!("Device output closed");
                    device.open = false;
                }
            }
        }

        event_loop.run_due();

        match ui {
            Ui::Textbox { console, .. } => {
                let status = status_line(device, console);
                console
                    .with_sink_mut(|sink| {
                        sink.set_status(status);
                        sink.present()
                    })
                    .context("Failed to draw console")?;
            }
            Ui::Raw(bridge) => {
                bridge.with_emulator_mut(HostTerminal::flush);
            }
        }

        let timeout = if backlog {
            Duration::ZERO
        } else {
            event_loop
                .time_until_next()
                .map_or(IDLE_POLL, |wait| wait.min(IDLE_POLL))
        };
        if !event_poll(timeout)? {
            continue;
        }
        let event = event_read()?;
        if let CrosstermEvent::Resize(width, height) = event {
            device.resize(width, height);
        }
        let keep_going = match ui {
            Ui::Textbox { console, focus } => handle_textbox_event(console, focus, event),
            Ui::Raw(bridge) => handle_raw_event(bridge, event),
        };
        if !keep_going {
            tracing::info!("Quit requested");
            return Ok(());
        }
    }
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    // Handle --dump-schema / --dump-config early (no terminal setup needed)
    if args.dump_schema {
        println!("{}", Config::json_schema()?);
        return Ok(());
    }
    if args.dump_config {
        let config = load_config(&args)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&config).context("Failed to serialize config")?
        );
        return Ok(());
    }

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(tracing_setup::default_log_path);
    tracing_setup::init_global(&log_file)
        .with_context(|| format!("Failed to create log file {}", log_file.display()))?;
    tracing::info!("serial-console starting");

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        terminal_modes::emergency_cleanup();
        original_hook(panic);
    }));

    let config = load_config(&args)?;
    let terminal_size = crossterm::terminal::size().context("Failed to read terminal size")?;
    let mut device = open_device(&args, terminal_size).context("Failed to open device")?;

    let bus = Bus::new(config.bus.history_limit);
    let port = ChannelPort::with_config(bus, &config.bus);
    let event_loop = Rc::new(EventLoop::new(RealTimeSource::shared()));
    connect_input(&port, device.writer.take());
    let recorder = args.record.as_ref().map(|_| RecordingAdapter::new(port.clone()));

    let mut terminal_modes = TerminalModes::enable(args.mode == Mode::Textbox)
        .context("Failed to set up terminal")?;

    let mut ui = match args.mode {
        Mode::Textbox => {
            let (width, height) = terminal_size;
            let sink = TerminalSink::new(io::stdout(), width, height);
            let console =
                ConsoleAdapter::new(sink, port.clone(), event_loop.clone(), &config.console);
            Ui::Textbox {
                console,
                focus: FocusCoordinator::global(),
            }
        }
        Mode::Raw => Ui::Raw(EmulatorBridge::new(
            port.clone(),
            event_loop.clone(),
            &config.emulator,
            || {
                Some(HostTerminal {
                    out: BufWriter::new(io::stdout()),
                })
            },
        )),
    };

    let result = run_event_loop(&mut ui, &mut device, &port, &event_loop);
    if let Err(e) = &result {
        tracing::error!("Console loop failed: {:#}", e);
    }

    drop(ui);
    terminal_modes.undo();
    device.shutdown();

    if let (Some(path), Some(recorder)) = (&args.record, &recorder) {
        std::fs::write(path, bus::wire_bytes(&recorder.take()))
            .with_context(|| format!("Failed to write transcript {}", path.display()))?;
        tracing::info!("Transcript written to {}", path.display());
    }

    result.context("Console loop returned an error")
}
