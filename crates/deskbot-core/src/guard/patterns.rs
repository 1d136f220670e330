//! Threat pattern catalogue
//!
//! Templates only. Matchers are compiled from these on every call so no
//! matcher object outlives a single analysis.

use regex::Regex;

/// Broad family a dangerous pattern belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatCategory {
    InstructionOverride,
    RoleManipulation,
    RoleMarker,
    CredentialExtraction,
    PromptExtraction,
    CodeInjection,
    Exfiltration,
    Jailbreak,
    DelimiterAbuse,
}

impl ThreatCategory {
    pub fn label(self) -> &'static str {
        match self {
            ThreatCategory::InstructionOverride => "instruction override",
            ThreatCategory::RoleManipulation => "role manipulation",
            ThreatCategory::RoleMarker => "system/role marker",
            ThreatCategory::CredentialExtraction => "credential extraction",
            ThreatCategory::PromptExtraction => "prompt extraction",
            ThreatCategory::CodeInjection => "script/code injection",
            ThreatCategory::Exfiltration => "data exfiltration",
            ThreatCategory::Jailbreak => "known jailbreak",
            ThreatCategory::DelimiterAbuse => "delimiter abuse",
        }
    }
}

/// Source form of one dangerous pattern
#[derive(Debug)]
pub struct PatternTemplate {
    pub category: ThreatCategory,
    pub description: &'static str,
    pub source: &'static str,
}

macro_rules! pattern {
    ($category:ident, $description:literal, $source:literal) => {
        PatternTemplate {
            category: ThreatCategory::$category,
            description: $description,
            source: $source,
        }
    };
}

/// Ordered dangerous-pattern catalogue; any single hit is enough to reject
pub static DANGEROUS_PATTERNS: &[PatternTemplate] = &[
    pattern!(
        InstructionOverride,
        "asks to ignore earlier instructions",
        r"(?i)\bignore\s+(all\s+|any\s+)?(of\s+)?(the\s+|your\s+|my\s+)?(previous|prior|above|earlier|preceding|former)\s+(instructions?|prompts?|rules?|directions?|context|messages?)"
    ),
    pattern!(
        InstructionOverride,
        "asks to disregard instructions",
        r"(?i)\bdisregard\s+(all\s+|any\s+)?(the\s+|your\s+)?(previous\s+|prior\s+|above\s+|earlier\s+)?(instructions?|prompts?|rules?|guidelines?|directions?)"
    ),
    pattern!(
        InstructionOverride,
        "asks to forget instructions",
        r"(?i)\bforget\s+(all\s+|everything\s+)?(about\s+)?(your|the|previous|prior|earlier)\s+(instructions?|rules?|training|guidelines?|prompts?)"
    ),
    pattern!(
        InstructionOverride,
        "asks to override instructions",
        r"(?i)\boverride\s+(all\s+)?(your|the|any)\s+(instructions?|rules?|guidelines?|programming|safety|restrictions?)"
    ),
    pattern!(
        InstructionOverride,
        "injects replacement instructions",
        r"(?i)\b(new|updated|revised)\s+(system\s+)?instructions?\s*:"
    ),
    pattern!(
        RoleManipulation,
        "tries to reassign the assistant's identity",
        r"(?i)\byou\s+are\s+(now|no\s+longer)\s+(an?\s+)?(unrestricted|unfiltered|uncensored|evil|rogue|different|new|jailbroken|free|bound|restricted|limited)\b"
    ),
    pattern!(
        RoleManipulation,
        "asks the assistant to act without restrictions",
        r"(?i)\bact\s+as\s+(if\s+you\s+(are|were)\s+)?(an?\s+)?(unrestricted|unfiltered|uncensored|evil|rogue|different)\b"
    ),
    pattern!(
        RoleManipulation,
        "asks the assistant to pretend to be something else",
        r"(?i)\bpretend\s+(to\s+be|you\s+are|that\s+you\s+are)\b"
    ),
    pattern!(
        RoleManipulation,
        "redefines behaviour from now on",
        r"(?i)\bfrom\s+now\s+on,?\s+you\s+(are|will|must|should)\b"
    ),
    pattern!(
        RoleManipulation,
        "requests roleplay as another persona",
        r"(?i)\broleplay\s+as\b"
    ),
    pattern!(
        RoleMarker,
        "system role marker at line start",
        r"(?im)^\s*system\s*:"
    ),
    pattern!(
        RoleMarker,
        "chat-template control token",
        r"(?i)<\|?\s*(im_start|im_end|system|endoftext)\s*\|?>"
    ),
    pattern!(
        RoleMarker,
        "instruction-tag marker",
        r"(?i)\[/?(inst|sys|system)\]|<<\s*/?sys\s*>>"
    ),
    pattern!(
        CredentialExtraction,
        "asks for credentials",
        r"(?i)\b(reveal|show|tell|give|print|display|output|share|leak|send)\s+(me\s+)?((your|the)\s+(api[\s_-]?keys?|secret\s+keys?|access\s+tokens?|credentials?)|your\s+(passwords?|secrets?|tokens?))"
    ),
    pattern!(
        CredentialExtraction,
        "asks what the credential is",
        r"(?i)\bwhat\s+(is|are)\s+(your\s+(api[\s_-]?keys?|secret\s+keys?|passwords?|access\s+tokens?|credentials?)|the\s+(api[\s_-]?key|secret\s+key|access\s+token))\b"
    ),
    pattern!(
        PromptExtraction,
        "asks to reveal the system prompt",
        r"(?i)\b(reveal|show|print|display|output|repeat|leak|tell\s+me)\s+(me\s+)?((your|the)\s+(system\s+prompt|initial\s+(prompt|instructions)|hidden\s+(prompt|instructions)|original\s+(prompt|instructions))|your\s+(instructions|prompt|rules))"
    ),
    pattern!(
        PromptExtraction,
        "asks what the instructions were",
        r"(?i)\bwhat\s+(are|were)\s+your\s+(initial\s+|original\s+|system\s+|hidden\s+)?(instructions|rules|prompt)"
    ),
    pattern!(
        CodeInjection,
        "script tag",
        r"(?i)<\s*script\b"
    ),
    pattern!(
        CodeInjection,
        "javascript URL",
        r"(?i)javascript\s*:"
    ),
    pattern!(
        CodeInjection,
        "inline event handler",
        r"(?i)\bon(error|load|click|mouseover|focus)\s*="
    ),
    pattern!(
        CodeInjection,
        "embedded frame",
        r"(?i)<\s*(iframe|object|embed)\b"
    ),
    pattern!(
        CodeInjection,
        "dynamic code evaluation",
        r"(?i)\beval\s*\(|\bnew\s+Function\s*\("
    ),
    pattern!(
        Exfiltration,
        "network call to an external URL",
        r#"(?i)\bfetch\s*\(\s*['"`]?https?://"#
    ),
    pattern!(
        Exfiltration,
        "scripted request or beacon",
        r"(?i)XMLHttpRequest|navigator\s*\.\s*sendBeacon|document\s*\.\s*cookie"
    ),
    pattern!(
        Exfiltration,
        "browser storage access",
        r"(?i)\b(localStorage|sessionStorage)\s*\.\s*(getItem|setItem|key)"
    ),
    pattern!(
        Exfiltration,
        "markdown image carrying query data",
        r"!\[[^\]]*\]\(\s*https?://[^)\s]*\?[^)\s]*="
    ),
    pattern!(
        Jailbreak,
        "DAN-style jailbreak",
        r"(?i)\bDAN\s+mode\b|\bdo\s+anything\s+now\b"
    ),
    pattern!(
        Jailbreak,
        "developer-mode jailbreak",
        r"(?i)\bgod\s+mode\s+(enabled|activated|on)\b|\(\s*developer\s+mode\s+output\s*\)"
    ),
    pattern!(
        Jailbreak,
        "asks to drop ethical limits",
        r"(?i)\b(without|no)\s+(any\s+)?(ethical|moral)\s+(guidelines|constraints|limits|boundaries)\b"
    ),
    pattern!(
        DelimiterAbuse,
        "fake section boundary",
        r"(?i)(```|---|===|\*\*\*|###)\s*(end|begin|start)\s+(of\s+)?(system|context|instructions?|prompt|reference)"
    ),
    pattern!(
        DelimiterAbuse,
        "reference-data delimiter forgery",
        r"(?i)<<<\s*(begin|end)\b"
    ),
];

/// Softer indicators; each costs a little score but never rejects alone
pub static SUSPICIOUS_KEYWORDS: &[&str] = &[
    "bypass",
    "jailbreak",
    "unrestricted",
    "unfiltered",
    "uncensored",
    "no restrictions",
    "without restrictions",
    "no limits",
    "hypothetically",
    "pretend",
    "roleplay",
    "admin mode",
    "sudo",
    "override",
    "disable safety",
    "system prompt",
];

/// Characters counted by the special-character ratio check
pub const SPECIAL_CHARS: &[char] = &['<', '>', '{', '}', '[', ']', '\\', '|', '`', '~', '^'];

pub const INVISIBLE_CHARS: &str = r"[\u{00AD}\u{200B}-\u{200F}\u{202A}-\u{202E}\u{2060}-\u{2064}\u{FEFF}]";
pub const BASE64_RUN: &str = r"[A-Za-z0-9+/]{50,}={0,2}";
pub const DELIMITER_TOKENS: &str = r"```|---|\*\*\*|###";
pub const CODE_FENCE: &str = r"```";
pub const ROLE_PREFIX: &str = r"(?im)^([ \t]*)(system|user|assistant|human)([ \t]*):";
pub const EXCESS_NEWLINES: &str = r"\n{4,}";

/// A template paired with its freshly compiled matcher
pub struct CompiledPattern {
    pub template: &'static PatternTemplate,
    pub regex: Regex,
}

/// Compile the dangerous catalogue
///
/// A template that fails to compile is logged and skipped rather than
/// taking the guard down.
pub fn compile_dangerous() -> Vec<CompiledPattern> {
    DANGEROUS_PATTERNS
        .iter()
        .filter_map(|template| match Regex::new(template.source) {
            Ok(regex) => Some(CompiledPattern { template, regex }),
            Err(e) => {
                tracing::error!(pattern = template.description, "Invalid guard pattern: {}", e);
                None
            }
        })
        .collect()
}

/// Compile one auxiliary pattern
pub fn compile(source: &str) -> Option<Regex> {
    match Regex::new(source) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::error!(source, "Invalid guard pattern: {}", e);
            None
        }
    }
}
