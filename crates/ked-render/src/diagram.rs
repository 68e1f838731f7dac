//! Diagram types and output formats understood by Kroki.
//!
//! Each [`DiagramType`] supports a subset of [`OutputFormat`]s; the catalogue
//! mirrors what the rendering service accepts for each endpoint.

use std::fmt;

/// Supported diagram types (Kroki endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramType {
    BlockDiag,
    Bpmn,
    Bytefield,
    SeqDiag,
    ActDiag,
    NwDiag,
    PacketDiag,
    RackDiag,
    C4PlantUml,
    D2,
    Dbml,
    Ditaa,
    DiagramsNet,
    Erd,
    Excalidraw,
    GraphViz,
    Mermaid,
    Nomnoml,
    Pikchr,
    PlantUml,
    Structurizr,
    Svgbob,
    Symbolator,
    TikZ,
    Vega,
    VegaLite,
    WaveDrom,
    WireViz,
}

impl DiagramType {
    /// Every supported diagram type, in catalogue order.
    pub const ALL: [Self; 28] = [
        Self::BlockDiag,
        Self::Bpmn,
        Self::Bytefield,
        Self::SeqDiag,
        Self::ActDiag,
        Self::NwDiag,
        Self::PacketDiag,
        Self::RackDiag,
        Self::C4PlantUml,
        Self::D2,
        Self::Dbml,
        Self::Ditaa,
        Self::DiagramsNet,
        Self::Erd,
        Self::Excalidraw,
        Self::GraphViz,
        Self::Mermaid,
        Self::Nomnoml,
        Self::Pikchr,
        Self::PlantUml,
        Self::Structurizr,
        Self::Svgbob,
        Self::Symbolator,
        Self::TikZ,
        Self::Vega,
        Self::VegaLite,
        Self::WaveDrom,
        Self::WireViz,
    ];

    /// Parse a diagram type from its endpoint name.
    ///
    /// Accepts `kroki-` prefixed names and the `dot` alias for `graphviz`.
    /// Returns None for unknown names.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let name = s.strip_prefix("kroki-").unwrap_or(s);
        if name == "dot" {
            return Some(Self::GraphViz);
        }
        Self::ALL.into_iter().find(|t| t.kroki_endpoint() == name)
    }

    /// Kroki endpoint name for this diagram type.
    #[must_use]
    pub fn kroki_endpoint(self) -> &'static str {
        match self {
            Self::BlockDiag => "blockdiag",
            Self::Bpmn => "bpmn",
            Self::Bytefield => "bytefield",
            Self::SeqDiag => "seqdiag",
            Self::ActDiag => "actdiag",
            Self::NwDiag => "nwdiag",
            Self::PacketDiag => "packetdiag",
            Self::RackDiag => "rackdiag",
            Self::C4PlantUml => "c4plantuml",
            Self::D2 => "d2",
            Self::Dbml => "dbml",
            Self::Ditaa => "ditaa",
            Self::DiagramsNet => "diagramsnet",
            Self::Erd => "erd",
            Self::Excalidraw => "excalidraw",
            Self::GraphViz => "graphviz",
            Self::Mermaid => "mermaid",
            Self::Nomnoml => "nomnoml",
            Self::Pikchr => "pikchr",
            Self::PlantUml => "plantuml",
            Self::Structurizr => "structurizr",
            Self::Svgbob => "svgbob",
            Self::Symbolator => "symbolator",
            Self::TikZ => "tikz",
            Self::Vega => "vega",
            Self::VegaLite => "vegalite",
            Self::WaveDrom => "wavedrom",
            Self::WireViz => "wireviz",
        }
    }

    /// Output formats the service can produce for this diagram type.
    #[must_use]
    pub fn supported_formats(self) -> &'static [OutputFormat] {
        use OutputFormat::{Base64, Jpeg, Pdf, Png, Svg, Txt};

        match self {
            Self::BlockDiag
            | Self::SeqDiag
            | Self::ActDiag
            | Self::NwDiag
            | Self::PacketDiag
            | Self::RackDiag
            | Self::Vega
            | Self::VegaLite => &[Png, Svg, Pdf],
            Self::C4PlantUml | Self::PlantUml | Self::Structurizr => &[Png, Svg, Pdf, Txt, Base64],
            Self::Ditaa | Self::DiagramsNet | Self::Mermaid | Self::WireViz => &[Png, Svg],
            Self::Erd | Self::GraphViz | Self::TikZ => &[Png, Svg, Jpeg, Pdf],
            Self::Bpmn
            | Self::Bytefield
            | Self::D2
            | Self::Dbml
            | Self::Excalidraw
            | Self::Nomnoml
            | Self::Pikchr
            | Self::Svgbob
            | Self::Symbolator
            | Self::WaveDrom => &[Svg],
        }
    }

    /// Whether the service can produce `format` for this diagram type.
    #[must_use]
    pub fn supports(self, format: OutputFormat) -> bool {
        self.supported_formats().contains(&format)
    }

    /// Resolve a requested format against this type's capabilities.
    ///
    /// Returns the requested format when supported. Otherwise falls back to
    /// SVG if available, else the first supported format.
    #[must_use]
    pub fn resolve_format(self, requested: Option<OutputFormat>) -> OutputFormat {
        if let Some(format) = requested
            && self.supports(format)
        {
            return format;
        }
        self.default_format()
    }

    /// Preferred format for this type: SVG when available.
    #[must_use]
    pub fn default_format(self) -> OutputFormat {
        let formats = self.supported_formats();
        if formats.contains(&OutputFormat::Svg) {
            OutputFormat::Svg
        } else {
            formats[0]
        }
    }
}

impl fmt::Display for DiagramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kroki_endpoint())
    }
}

/// How a rendered format is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    /// Shown in the zoomable viewport.
    Image,
    /// Shown as a text preview.
    Text,
    /// Not previewed; fetched only when the user downloads it.
    Download,
}

/// Output format for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
    Jpeg,
    Pdf,
    /// ASCII art (PlantUML family).
    Txt,
    /// Base64-encoded PNG returned as text.
    Base64,
}

impl OutputFormat {
    /// Parse format from its Kroki name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "base64" => Some(Self::Base64),
            _ => None,
        }
    }

    /// Kroki name of the format, as used in request paths.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Base64 => "base64",
        }
    }

    #[must_use]
    pub fn display_kind(self) -> DisplayKind {
        match self {
            Self::Svg | Self::Png | Self::Jpeg => DisplayKind::Image,
            Self::Txt | Self::Base64 => DisplayKind::Text,
            Self::Pdf => DisplayKind::Download,
        }
    }

    /// MIME type the service responds with for this format.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Pdf => "application/pdf",
            Self::Txt | Self::Base64 => "text/plain",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single render request.
///
/// Captured from the editor at trigger time and never mutated afterwards;
/// a newer request supersedes it instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramRequest {
    /// Diagram source text.
    pub source: String,
    pub diagram_type: DiagramType,
    pub output_format: OutputFormat,
}

impl DiagramRequest {
    /// Create a new diagram request.
    pub fn new(
        source: impl Into<String>,
        diagram_type: DiagramType,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            source: source.into(),
            diagram_type,
            output_format,
        }
    }

    /// Suggested filename for saving the rendered output.
    #[must_use]
    pub fn download_filename(&self) -> String {
        format!("diagram.{}", self.output_format.as_str())
    }
}
