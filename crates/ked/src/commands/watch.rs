//! `ked watch` command implementation.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};

use clap::Args;
use ked_render::{
    BlobRegistry, ConfigProvider, DiagramRequest, LiveRenderer, RenderSession, Size,
    SourceProvider,
};
use notify::{EventKind, RecursiveMode, Watcher};

use crate::error::CliError;
use crate::output::Output;
use crate::target::{EditorBuffer, FileTarget, ReportObserver};

use super::{
    ConfigArgs, DiagramArgs, build_dispatcher, check_output, default_output, parse_viewport,
};

/// Arguments for the watch command.
#[derive(Args)]
pub(crate) struct WatchArgs {
    /// Diagram source file to watch.
    input: PathBuf,

    /// Output file (default: input with the format's extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    diagram: DiagramArgs,

    #[command(flatten)]
    config: ConfigArgs,

    /// Delay after the last change before rendering, in milliseconds
    /// (overrides config).
    #[arg(long)]
    debounce: Option<u64>,

    /// Viewport used to compute the fit zoom.
    #[arg(long, default_value = "1280x800", value_parser = parse_viewport)]
    viewport: Size,
}

/// Input to the watch loop.
enum WatchEvent {
    /// The watched file changed on disk.
    Changed,
    /// Explicit refresh requested from the terminal.
    Refresh,
}

impl WatchArgs {
    /// Execute the watch command.
    ///
    /// Runs until interrupted.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.config.load(self.debounce)?;
        let (diagram_type, output_format) = self.diagram.resolve(&config)?;
        let input = self.input.canonicalize()?;
        let source = std::fs::read_to_string(&input)?;
        let path = self
            .output
            .unwrap_or_else(|| default_output(Some(&self.input), output_format));
        check_output(Some(&input), &path)?;
        let auto_refresh = config.editor.auto_refresh;

        let blobs = BlobRegistry::new();
        let dispatcher = build_dispatcher(&config, &blobs);
        let buffer = Arc::new(EditorBuffer::new(DiagramRequest::new(
            source,
            diagram_type,
            output_format,
        )));
        let debounce = config.debounce_delay();
        let provider: Arc<dyn ConfigProvider> = Arc::new(config);
        let session = RenderSession::new(FileTarget::new(path.clone(), self.viewport), provider)
            .with_observer(Arc::new(ReportObserver::new(path.clone())));
        let source_provider = Arc::clone(&buffer) as Arc<dyn SourceProvider>;
        let renderer =
            LiveRenderer::new(session, source_provider, dispatcher)?.with_auto_refresh(auto_refresh);

        let (tx, rx) = mpsc::channel();
        let _watcher = watch_file(&input, tx.clone())?;
        spawn_refresh_reader(tx);

        output.info(&format!("Watching {}", input.display()));
        output.info(&format!("Output: {}", path.display()));
        if auto_refresh {
            output.info(&format!(
                "Auto refresh: after {}ms; press Enter to render now",
                debounce.as_millis()
            ));
        } else {
            output.info("Auto refresh: disabled; press Enter to render");
        }

        renderer.trigger_now();

        for event in rx {
            match event {
                WatchEvent::Changed => match std::fs::read_to_string(&input) {
                    Ok(source) => {
                        if buffer.set_source(source) {
                            renderer.edited();
                        }
                    }
                    Err(e) => output.warning(&format!("Cannot read {}: {e}", input.display())),
                },
                WatchEvent::Refresh => renderer.trigger_now(),
            }
        }

        renderer.wait_idle();
        renderer.teardown();
        Ok(())
    }
}

/// Watch `file` through its parent directory, so editors that replace the
/// file on save are still seen.
fn watch_file(
    file: &Path,
    tx: mpsc::Sender<WatchEvent>,
) -> Result<notify::RecommendedWatcher, CliError> {
    let watched = file.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else { return };
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        if event.paths.iter().any(|p| p == &watched) {
            let _ = tx.send(WatchEvent::Changed);
        }
    })?;

    let dir = file.parent().unwrap_or(file);
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Forward each line typed on stdin as a refresh request.
fn spawn_refresh_reader(tx: mpsc::Sender<WatchEvent>) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if line.is_err() || tx.send(WatchEvent::Refresh).is_err() {
                return;
            }
        }
    });
}
