//! Output formats of each agent's `mcp list` command.
//!
//! These are not versioned contracts; when an agent changes its layout the
//! fixture under `tests/fixtures/` and the entry here change together.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::AgentFamily;

/// Status glyphs printed in front of (or after) a server line.
pub const STATUS_GLYPHS: &[char] = &['✓', '✗', '⚠'];

#[derive(Debug)]
pub enum ListingFormat {
    /// One server per line, matched by `line`. Named groups: `name`,
    /// `target`, optional `transport`, optional `glyph`, `status`.
    Text {
        header: &'static str,
        empty_sentinels: &'static [&'static str],
        line: Regex,
    },
    /// A JSON array of server objects.
    Json,
}

const NO_SERVERS: &str = "No MCP servers configured";

// `name: target [(transport)] - ✓ Status`
static CLAUDE: LazyLock<ListingFormat> = LazyLock::new(|| ListingFormat::Text {
    header: "Checking MCP server health",
    empty_sentinels: &[NO_SERVERS],
    line: compile(
        r"^(?P<name>[^\s:][^:]*?):\s+(?P<target>.+?)(?:\s+\((?P<transport>[A-Za-z_-]+)\))?\s+-\s+(?P<glyph>[✓✗⚠])\s*(?P<status>.+)$",
    ),
});

// `✓ name: target (transport) - Status`
static GEMINI: LazyLock<ListingFormat> = LazyLock::new(|| ListingFormat::Text {
    header: "Configured MCP servers",
    empty_sentinels: &[NO_SERVERS],
    line: gemini_line(),
});

static IFLOW: LazyLock<ListingFormat> = LazyLock::new(|| ListingFormat::Text {
    header: "Configured MCP servers",
    empty_sentinels: &[NO_SERVERS, "未配置"],
    line: gemini_line(),
});

static CODEX: LazyLock<ListingFormat> = LazyLock::new(|| ListingFormat::Json);

fn gemini_line() -> Regex {
    compile(
        r"^(?P<glyph>[✓✗⚠])\s+(?P<name>[^:]+?):\s+(?P<target>.+?)\s+\((?P<transport>[A-Za-z_-]+)\)\s+-\s+(?P<status>.+)$",
    )
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("listing pattern is a valid regex")
}

/// Listing format for a family; `None` for agents that are not CLIs.
pub fn listing_format(family: AgentFamily) -> Option<&'static ListingFormat> {
    match family {
        AgentFamily::ClaudeCode => Some(&*CLAUDE),
        AgentFamily::GeminiCli | AgentFamily::Qwen => Some(&*GEMINI),
        AgentFamily::Iflow => Some(&*IFLOW),
        AgentFamily::Codex => Some(&*CODEX),
        AgentFamily::Local => None,
    }
}
