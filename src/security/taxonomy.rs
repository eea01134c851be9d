//! Danger taxonomy: the ordered catalog of rules that classify commands.
//!
//! Block-tier rules stop evaluation on the first hit. Warn-tier rules never
//! block; every match becomes an advisory warning. All patterns are
//! case-insensitive because the tools they target accept mixed-case flags.

use anyhow::Context as _;
use regex::Regex;

/// How a rule affects the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Block,
    Warn,
}

/// What a rule looks for in a command string.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Regular expression searched anywhere in the text.
    Pattern(Regex),
    /// `rm` with both recursive and force flags, in any order, case or split.
    RecursiveForceDelete,
}

impl Matcher {
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::RecursiveForceDelete => is_recursive_force_delete(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DangerRule {
    pub id: &'static str,
    pub matcher: Matcher,
    pub reason: &'static str,
    pub severity: Severity,
}

impl DangerRule {
    /// Build a regex-backed rule.
    pub fn pattern(
        id: &'static str,
        pattern: &str,
        reason: &'static str,
        severity: Severity,
    ) -> anyhow::Result<Self> {
        let re = Regex::new(pattern).with_context(|| format!("Invalid pattern for rule '{id}'"))?;
        Ok(Self {
            id,
            matcher: Matcher::Pattern(re),
            reason,
            severity,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

// (id, pattern, reason)
type RuleSpec = (&'static str, &'static str, &'static str);

const BLOCK_RULES: &[RuleSpec] = &[
    (
        "block-device-redirect",
        r"(?i)>\s*/dev/(sd[a-z]|nvme\d|hd[a-z]|vd[a-z]|xvd[a-z]|disk\d|mmcblk\d)",
        "Direct write to a block device",
    ),
    (
        "block-device-dd",
        r"(?i)\bdd\b[^;&|]*\bof=/dev/(sd[a-z]|nvme\d|hd[a-z]|vd[a-z]|xvd[a-z]|disk\d|mmcblk\d)",
        "Direct write to a block device with dd",
    ),
    (
        "filesystem-create",
        r"(?i)\b(mkfs(\.[a-z0-9]+)?|mke2fs|mkswap|wipefs)\b",
        "Filesystem creation or wipe tool",
    ),
    (
        "chmod-system-path",
        r"(?i)\bchmod\b[^;&|]*\s(0?777|a\+rwx|[ugoa]*\+s|[2-7][0-7]{3})\s+/(etc|usr|bin|sbin|boot|lib\w*|root|var)?(/|\s|$)",
        "Privilege-escalating permission change on a system path",
    ),
    (
        "chown-system-path",
        r"(?i)\bchown\b[^;&|]*\s-[a-z]*r[a-z]*\s([^;&|]*\s)?/(etc|usr|bin|sbin|boot|lib\w*|root|var)?(/|\s|$)",
        "Recursive ownership change on a system path",
    ),
    (
        "sudoers-write",
        r"(?i)(>>?|\btee\b(\s+-a)?)\s*/etc/sudoers",
        "Modification of sudoers (privilege escalation)",
    ),
    (
        "fork-bomb",
        r":\s*\(\s*\)\s*\{",
        "Fork bomb",
    ),
    (
        "reverse-shell-devtcp",
        r"(?i)/dev/(tcp|udp)/",
        "Reverse shell construct (/dev/tcp)",
    ),
    (
        "reverse-shell-netcat-exec",
        r"(?i)\b(nc|ncat|netcat)\b[^;&|]*\s-[a-z]*e\s",
        "Reverse shell construct (netcat -e)",
    ),
    (
        "reverse-shell-listener-pipe",
        r"(?i)\b(nc|ncat|netcat)\b[^;&|]*\s-[a-z]*l[^|]*\|\s*(ba|z|k|da)?sh\b",
        "Reverse shell construct (network listener piped to a shell)",
    ),
    (
        "reverse-shell-fifo",
        r"(?i)\bmkfifo\b.*\b(nc|ncat|netcat|telnet)\b",
        "Reverse shell construct (fifo relay)",
    ),
    (
        "reverse-shell-socat",
        r"(?i)\bsocat\b.*\b(exec|system):",
        "Reverse shell construct (socat exec)",
    ),
    (
        "history-clear",
        r"(?i)\bhistory\s+-[a-z]*c",
        "Shell history tampering",
    ),
    (
        "history-disable",
        r"(?i)(\bunset\s+HISTFILE\b|\bHISTFILE=/dev/null|\bHISTSIZE=0\b|\bset\s+\+o\s+history\b)",
        "Shell history tampering",
    ),
    (
        "history-file-wipe",
        r"(?i)(>\s*|\b(rm|shred|truncate)\b[^;&|]*\s)\S*\.\w*_history\b",
        "Shell history tampering",
    ),
    (
        "remote-script-pipe",
        r"(?i)\b(curl|wget|fetch)\b[^;&]*\|\s*(?:(?:\S*/)?(?:(?:sudo|doas)(?:\s+-[ugCD]\s+\S+|\s+-\S+)*|env(?:\s+-\S+|\s+\w+=\S*)*|command(?:\s+-\S+)*|exec|nohup)\s+)*(\S*/)?((ba|z|k|da|fi)?sh|python[0-9.]*|perl|ruby|node|php)\b",
        "Remote script piped directly into an interpreter (supply-chain risk)",
    ),
    (
        "remote-script-process-substitution",
        r"(?i)(\b(ba|z|k|da)?sh|\bsource|\.)\s+<\(\s*(curl|wget)\b",
        "Remote script executed via process substitution (supply-chain risk)",
    ),
    (
        "remote-script-inline",
        r#"(?i)\b((ba|z|k|da)?sh\s+-c|eval)\s+["']?\$?\(?\s*(curl|wget)\b"#,
        "Remote script executed inline (supply-chain risk)",
    ),
    (
        "download-then-execute",
        r"(?i)\b(curl\b[^;&|]*\s(-[a-z]*o|--output|--remote-name)\b|wget\b)[^;&|]*(&&|;)\s*(sudo\s+)?(\./\S+|(ba|z|k|da)?sh\s+\S+|chmod\s+[^;&|]*\+x|python[0-9.]*\s+\S+|perl\s+\S+|ruby\s+\S+|node\s+\S+|source\s+\S+|\.\s+\S+)",
        "Download chained with execution (supply-chain risk)",
    ),
    (
        "encoded-payload-pipe",
        r"(?i)\b(base64\s+(-[a-z]*d\b|--decode)|xxd\s+-[a-z]*r|openssl\s+(enc\s+)?[^|]*-d\b)[^;&]*\|\s*(?:(?:\S*/)?(?:(?:sudo|doas)(?:\s+-[ugCD]\s+\S+|\s+-\S+)*|env(?:\s+-\S+|\s+\w+=\S*)*|command(?:\s+-\S+)*|exec|nohup)\s+)*(\S*/)?((ba|z|k|da)?sh|python[0-9.]*|perl|ruby|node|php)\b",
        "Encoded payload decoded into an interpreter",
    ),
    (
        "encoded-payload-eval",
        r"(?i)\beval\b.*\bbase64\s+(-[a-z]*d\b|--decode)",
        "Encoded payload passed to eval",
    ),
    (
        "python-oneliner",
        r"(?i)\bpython[0-9.]*\b.*\s-c\b.*(\bimport\s+[\w, ]*\b(os|subprocess|shutil|pty|socket)\b|\bfrom\s+(os|subprocess|shutil|pty|socket)\b|__import__)",
        "Python one-liner importing process or filesystem control",
    ),
    (
        "perl-oneliner",
        r"(?i)\bperl\b.*\s-[a-z]*e\b.*\b(system|exec|unlink|rmtree|socket)\b",
        "Perl one-liner with process or filesystem control",
    ),
    (
        "ruby-oneliner",
        r"(?i)\bruby\b.*\s-[a-z]*e\b.*(\b(system|exec|spawn|FileUtils)\b|IO\.popen|%x)",
        "Ruby one-liner with process or filesystem control",
    ),
    (
        "node-oneliner",
        r#"(?i)\bnode\b.*\s(-e|--eval|-p|--print)\b.*\brequire\s*\(\s*["']?(child_process|fs)\b"#,
        "Node one-liner requiring process or filesystem control",
    ),
    (
        "find-delete",
        r"(?i)\bfind\b[^;&|]*\s-delete\b",
        "Bulk deletion via find -delete",
    ),
    (
        "find-exec-rm",
        r"(?i)\bfind\b[^;&|]*\s-exec(dir)?\s+(sudo\s+)?(\S*/)?(rm|shred|unlink)\b",
        "Bulk deletion via find -exec rm",
    ),
    (
        "xargs-rm",
        r"(?i)\bxargs\b[^;&|]*\b(rm|shred|unlink)\b",
        "Bulk deletion via xargs rm",
    ),
    (
        "sudo-shell",
        r"(?i)\bsudo\s+((?-i:-[a-zA-Z]*[is][a-zA-Z]*)(\s|$)|--(shell|login)\b|(-u\s+\S+\s+|-\S+\s+)*(su|(ba|z|k|da|fi)?sh|passwd|visudo|chsh)(\s|$))",
        "Privilege escalation to a root shell via sudo",
    ),
];

const WARN_RULES: &[RuleSpec] = &[
    (
        "sudo",
        r"(?i)\b(sudo|doas)\b",
        "Command runs with elevated privileges (sudo)",
    ),
    (
        "global-install-npm",
        r"(?i)\b(npm|pnpm)\s+(install|i|add)\b[^;&|]*\s(-g|--global)\b",
        "Global package installation",
    ),
    (
        "global-install-yarn",
        r"(?i)\byarn\s+global\s+add\b",
        "Global package installation",
    ),
    (
        "global-install-pip",
        r"(?i)(\bpip[0-9.]*\s+install\b[^;&|]*\s--user\b|\bsudo\s+(-\S+\s+)*pip[0-9.]*\s+install\b)",
        "Global package installation",
    ),
    (
        "global-install-other",
        r"(?i)\b(gem|cargo)\s+install\b",
        "Global package installation",
    ),
    (
        "git-force-push",
        r"(?i)\bgit\s+push\b[^;&|]*\s(--force(-with-lease)?|-f)\b",
        "Force push rewrites remote history",
    ),
    (
        "git-hard-reset",
        r"(?i)\bgit\s+reset\s+--hard\b",
        "Hard reset discards uncommitted changes",
    ),
    (
        "git-clean",
        r"(?i)\bgit\s+clean\s+-[a-z]*f",
        "git clean deletes untracked files",
    ),
    (
        "npm-publish",
        r"(?i)\bnpm\s+publish\b",
        "Publishes a package to a public registry",
    ),
    (
        "eval",
        r"(?i)\beval\s",
        "eval executes dynamically constructed code",
    ),
    (
        "chmod-world-writable",
        r"(?i)\bchmod\s+(-[a-z]+\s+)*(0?777|a\+rwx)\b",
        "World-writable permissions",
    ),
    (
        "rm-recursive",
        r"(?i)\brm\s+(-\S+\s+)*-[a-z]*r",
        "Recursive delete",
    ),
];

/// Compiled, ordered rule catalog. Built once and shared by reference.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<DangerRule>,
}

impl RuleSet {
    /// Compile the built-in catalog.
    pub fn compile() -> anyhow::Result<Self> {
        let mut rules = Vec::with_capacity(BLOCK_RULES.len() + WARN_RULES.len() + 1);

        rules.push(DangerRule {
            id: "rm-recursive-force",
            matcher: Matcher::RecursiveForceDelete,
            reason: "Recursive force delete (rm -rf) is not allowed",
            severity: Severity::Block,
        });

        for &(id, pattern, reason) in BLOCK_RULES {
            rules.push(DangerRule::pattern(id, pattern, reason, Severity::Block)?);
        }
        for &(id, pattern, reason) in WARN_RULES {
            rules.push(DangerRule::pattern(id, pattern, reason, Severity::Warn)?);
        }

        tracing::debug!(rules = rules.len(), "Compiled danger taxonomy");
        Ok(Self { rules })
    }

    /// Append a rule after the built-in ones of the same tier.
    pub fn push(&mut self, rule: DangerRule) {
        self.rules.push(rule);
    }

    pub fn block_rules(&self) -> impl Iterator<Item = &DangerRule> {
        self.rules.iter().filter(|r| r.severity == Severity::Block)
    }

    pub fn warn_rules(&self) -> impl Iterator<Item = &DangerRule> {
        self.rules.iter().filter(|r| r.severity == Severity::Warn)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn is_segment_separator(c: char) -> bool {
    matches!(c, ';' | '|' | '&' | '(' | ')' | '{' | '}' | '`' | '\n')
}

/// Quotes and backslashes do not change what the shell runs.
fn clean_token(token: &str) -> String {
    token.chars().filter(|c| !matches!(c, '"' | '\'' | '\\')).collect()
}

fn is_rm(token: &str) -> bool {
    let name = token.rsplit('/').next().unwrap_or(token);
    name.eq_ignore_ascii_case("rm")
}

/// True when some command segment runs `rm` with both recursive and force.
///
/// Flags may be bundled (`-rf`, `-Rf`, `-fr`) or split (`-r -f`,
/// `--recursive --force`); `--` does not end the scan.
pub(crate) fn is_recursive_force_delete(command: &str) -> bool {
    command.split(is_segment_separator).any(segment_deletes_recursively)
}

fn segment_deletes_recursively(segment: &str) -> bool {
    let tokens: Vec<String> = segment.split_whitespace().map(clean_token).collect();
    let Some(pos) = tokens.iter().position(|t| is_rm(t)) else {
        return false;
    };

    let mut recursive = false;
    let mut force = false;
    for token in &tokens[pos + 1..] {
        let lower = token.to_ascii_lowercase();
        if lower == "--" {
            continue;
        }
        if let Some(long) = lower.strip_prefix("--") {
            match long {
                "recursive" => recursive = true,
                "force" => force = true,
                _ => {}
            }
        } else if let Some(short) = lower.strip_prefix('-') {
            if !short.is_empty() && short.chars().all(|c| c.is_ascii_alphabetic()) {
                recursive |= short.contains('r');
                force |= short.contains('f');
            }
        }
    }

    recursive && force
}
