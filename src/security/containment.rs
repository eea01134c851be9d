//! Filesystem containment for file write/edit targets.
//!
//! Paths are resolved through symlinks before any comparison, so a link
//! placed inside an allowed directory cannot smuggle a write to a target
//! outside it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;
use regex::Regex;

use super::validate::validate_path;
use super::{Decision, PathCheckResult};
use crate::config::{CONFIG_FILE_NAME, GateConfig, STATE_DIR_NAME};

/// Symlink hops followed before giving up on resolution.
const MAX_SYMLINK_HOPS: usize = 40;

// (category, pattern) matched against the absolute resolved path.
const PROTECTED_PATHS: &[(&str, &str)] = &[
    (
        "system directory",
        r"^/(etc|usr|bin|sbin|boot|lib|lib32|lib64|sys|proc|dev|opt/homebrew|System|Library|private/etc|var/lib|var/log|var/db)(/|$)",
    ),
    (
        "credential directory",
        r"/\.(ssh|gnupg|aws|azure)(/|$)",
    ),
    (
        "cloud credentials",
        r"(/\.config/gcloud(/|$)|/\.kube/config$|/\.docker/config\.json$)",
    ),
    (
        "credential file",
        r"/\.(netrc|git-credentials|pypirc)$",
    ),
    (
        "version-control internals",
        r"/\.(git|hg|svn)(/|$)",
    ),
    (
        "shell startup file",
        r"(/\.(bashrc|bash_profile|bash_login|bash_logout|profile|zshrc|zshenv|zprofile|zlogin|kshrc|cshrc|tcshrc)$|/\.config/fish/config\.fish$)",
    ),
];

// (warning, pattern) matched against the project-relative path when the
// target is inside the project, the absolute path otherwise.
const ADVISORY_PATHS: &[(&str, &str)] = &[
    ("Sensitive file (environment variables)", r"/\.env(\.[^/]*)?$"),
    ("Sensitive file (key material)", r"(?i)\.(pem|key|p12|pfx|jks|keystore)$"),
    ("Sensitive file (SSH key)", r"/id_(rsa|dsa|ecdsa|ed25519)(\.pub)?$"),
    ("Sensitive file (name suggests secrets)", r"(?i)(secret|password|passwd|credential)[^/]*$"),
    (
        "Lock file normally generated by a package manager",
        r"/(package-lock\.json|yarn\.lock|pnpm-lock\.yaml|Cargo\.lock|poetry\.lock|Gemfile\.lock|composer\.lock)$",
    ),
    (
        "Generated or third-party file",
        r"(/(node_modules|vendor|dist|build|__pycache__)/|\.min\.(js|css)$|\.pyc$)",
    ),
    (
        "Important project file, verify changes",
        r"/(README\.md|CHANGELOG\.md|LICENSE|package\.json|tsconfig\.json|pyproject\.toml|Cargo\.toml)$",
    ),
];

struct PathRule {
    label: &'static str,
    pattern: Regex,
}

fn compile_rules(specs: &[(&'static str, &str)]) -> anyhow::Result<Vec<PathRule>> {
    specs
        .iter()
        .map(|&(label, pattern)| {
            let pattern =
                Regex::new(pattern).with_context(|| format!("Invalid path pattern for '{label}'"))?;
            Ok(PathRule { label, pattern })
        })
        .collect()
}

/// Resolves file targets and checks them against permitted roots and the
/// protected/sensitive path taxonomies.
pub struct PathChecker {
    project_root: PathBuf,
    roots: Vec<PathBuf>,
    /// Files and directories holding the gate's own policy and audit trail.
    gate_state: Vec<PathBuf>,
    protected: Vec<PathRule>,
    advisory: Vec<PathRule>,
    max_path_len: usize,
    large_file_bytes: u64,
}

impl PathChecker {
    /// Build a checker for `config.project_root`.
    ///
    /// The project root and the system temp directory are always permitted;
    /// `extra_roots` adds configuration directories. Roots are canonicalized
    /// once here.
    pub fn new(config: &GateConfig) -> anyhow::Result<Self> {
        let project_root = canonical_root(&config.project_root);
        let mut roots = vec![project_root.clone(), canonical_root(&std::env::temp_dir())];
        for root in &config.extra_roots {
            let root = canonical_root(root);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        tracing::debug!(?roots, "Permitted roots");

        let audit_log = config.audit_log_path();
        let mut gate_state = vec![
            project_root.join(CONFIG_FILE_NAME),
            project_root.join(STATE_DIR_NAME),
        ];
        for suffix in [".1", ".lock"] {
            let mut sibling = audit_log.clone().into_os_string();
            sibling.push(suffix);
            gate_state.push(PathBuf::from(sibling));
        }
        gate_state.push(audit_log);
        gate_state.extend(config.config_path.clone());
        let gate_state = gate_state
            .iter()
            .map(|p| resolve_or_clean(&absolute_from(&project_root, p)))
            .collect();

        Ok(Self {
            project_root,
            roots,
            gate_state,
            protected: compile_rules(PROTECTED_PATHS)?,
            advisory: compile_rules(ADVISORY_PATHS)?,
            max_path_len: config.max_path_len,
            large_file_bytes: config.large_file_bytes,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Decide whether `tool_name` may write to `raw_path`.
    ///
    /// The path is resolved twice: `..` applied lexically first (what file
    /// tools do) and `..` applied after following links (what the kernel
    /// does). Both targets must pass.
    pub fn check_path(&self, raw_path: &str, tool_name: &str) -> PathCheckResult {
        if let Err(e) = validate_path(raw_path, self.max_path_len) {
            tracing::debug!(tool = tool_name, error = %e, "Path failed structural validation");
            return Decision::block(e.to_string());
        }

        let resolved = self.resolve(raw_path);
        let physical = self.resolve_physical(raw_path);
        tracing::debug!(
            tool = tool_name,
            raw = raw_path,
            resolved = %resolved.display(),
            physical = %physical.display(),
            "Resolved path"
        );
        let targets: Vec<&Path> = if physical == resolved {
            vec![&resolved]
        } else {
            vec![&resolved, &physical]
        };

        for target in &targets {
            if let Some(reason) = self.protected_reason(target) {
                return Decision::block(reason);
            }
        }
        for target in &targets {
            if !self.is_contained(target) {
                return Decision::block(format!(
                    "Path is outside the permitted roots: {}",
                    path_string(target)
                ));
            }
        }

        let scoped = self.project_relative(&resolved);
        let mut decision = Decision::allow(Vec::new());
        for rule in &self.advisory {
            if rule.pattern.is_match(&scoped) {
                decision.push_warning(format!("{}: {raw_path}", rule.label));
            }
        }

        if let Ok(meta) = fs::metadata(&resolved) {
            if meta.is_file() && meta.len() > self.large_file_bytes {
                decision.push_warning(format!(
                    "Large file modification ({:.1} MiB): {raw_path}",
                    meta.len() as f64 / (1024.0 * 1024.0)
                ));
            }
        }

        decision
    }

    /// Resolve `raw` to an absolute path with symlinks followed, after
    /// applying `.` and `..` lexically.
    ///
    /// Missing components are kept as written. On any filesystem error the
    /// lexically cleaned absolute path is returned instead.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        resolve_or_clean(&lexical_clean(&self.absolute(raw)))
    }

    /// Like [`resolve`](Self::resolve), but `..` steps out of the real
    /// directory a symlink points to.
    pub fn resolve_physical(&self, raw: &str) -> PathBuf {
        resolve_or_clean(&self.absolute(raw))
    }

    fn absolute(&self, raw: &str) -> PathBuf {
        absolute_from(&self.project_root, &expand_home(raw))
    }

    fn protected_reason(&self, target: &Path) -> Option<String> {
        let absolute = path_string(target);
        if self.gate_state.iter().any(|state| target.starts_with(state)) {
            return Some(format!("Protected path (gate configuration or audit log): {absolute}"));
        }
        self.protected
            .iter()
            .find(|r| r.pattern.is_match(&absolute))
            .map(|rule| format!("Protected path ({}): {absolute}", rule.label))
    }

    fn is_contained(&self, resolved: &Path) -> bool {
        self.roots.iter().any(|root| resolved.starts_with(root))
    }

    /// Path relative to the project root with a leading `/`, so patterns
    /// anchored on `/` also hit top-level project files.
    fn project_relative(&self, resolved: &Path) -> String {
        match resolved.strip_prefix(&self.project_root) {
            Ok(rel) => format!("/{}", path_string(rel)),
            Err(_) => path_string(resolved),
        }
    }
}

/// Default extra root: the gate's own configuration directory.
pub fn default_extra_roots() -> Vec<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| vec![PathBuf::from(home).join(".config").join("rusty-guard")])
        .unwrap_or_default()
}

fn canonical_root(root: &Path) -> PathBuf {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(root))
            .unwrap_or_else(|_| root.to_path_buf())
    };
    fs::canonicalize(&absolute).unwrap_or_else(|_| lexical_clean(&absolute))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(raw.trim_start_matches('~').trim_start_matches('/'));
        }
    }
    PathBuf::from(raw)
}

/// Apply `.` and `..` without touching the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn absolute_from(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn resolve_or_clean(absolute: &Path) -> PathBuf {
    let mut hops = MAX_SYMLINK_HOPS;
    match resolve_real(absolute, &mut hops) {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!(path = %absolute.display(), error = %e, "Falling back to unresolved path");
            lexical_clean(absolute)
        }
    }
}

/// Walk `path` one component at a time like `realpath`, following every
/// symlink met along the way, dangling ones included.
///
/// `..` pops the already resolved prefix. Components that do not exist are
/// kept as written, so a later `..` can climb back into real directories
/// and their links are still followed.
fn resolve_real(path: &Path, hops: &mut usize) -> io::Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => {
                out.push(name);
                let meta = match fs::symlink_metadata(&out) {
                    Ok(meta) => meta,
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if !meta.file_type().is_symlink() {
                    continue;
                }
                if *hops == 0 {
                    return Err(io::Error::other("too many levels of symbolic links"));
                }
                *hops -= 1;
                let target = fs::read_link(&out)?;
                out.pop();
                let target = absolute_from(&out, &target);
                out = resolve_real(&target, hops)?;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Verdict;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn config(root: &Path) -> GateConfig {
        GateConfig {
            extra_roots: Vec::new(),
            ..GateConfig::for_project(root)
        }
    }

    fn checker(root: &Path) -> PathChecker {
        PathChecker::new(&config(root)).unwrap()
    }

    /// `<tmp>/project` plus a checker whose only root is that project.
    fn narrowed(dir: &TempDir) -> (PathBuf, PathChecker) {
        let project = dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        let checker = PathChecker {
            roots: vec![fs::canonicalize(&project).unwrap()],
            ..checker(&project)
        };
        (project, checker)
    }

    #[test]
    fn test_plain_project_file_is_allowed() {
        let dir = TempDir::new().unwrap();
        let checker = checker(dir.path());
        let decision = checker.check_path("src/lib.rs", "Write");
        assert_eq!(decision, Decision::allow(Vec::new()));
    }

    #[test]
    fn test_new_file_in_new_directory_is_resolved() {
        let dir = TempDir::new().unwrap();
        let checker = checker(dir.path());
        let resolved = checker.resolve("a/b/../c.txt");
        assert_eq!(resolved, checker.project_root().join("a").join("c.txt"));
    }

    #[test]
    fn test_parent_traversal_out_of_roots_is_blocked() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        fs::create_dir(&project).unwrap();
        let other = dir.path().join("other");
        fs::create_dir(&other).unwrap();
        // The system temp dir is a permitted root too; narrow to the project.
        let checker = PathChecker {
            roots: vec![fs::canonicalize(&project).unwrap()],
            ..checker(&project)
        };
        let decision = checker.check_path("../other/x.txt", "Write");
        assert_eq!(decision.verdict(), Verdict::Block);
        assert!(decision.reason().unwrap().contains("outside the permitted roots"));
    }

    #[test]
    fn test_protected_system_path() {
        let dir = TempDir::new().unwrap();
        let decision = checker(dir.path()).check_path("/etc/passwd", "Write");
        assert_eq!(decision.verdict(), Verdict::Block);
        assert!(decision.reason().unwrap().contains("Protected path"));
    }

    #[test]
    fn test_protected_inside_project() {
        let dir = TempDir::new().unwrap();
        let checker = checker(dir.path());
        for path in [".git/config", ".git/hooks/pre-commit", ".ssh/authorized_keys", ".bashrc"] {
            let decision = checker.check_path(path, "Edit");
            assert!(decision.is_blocked(), "expected block: {path}");
        }
        assert!(!checker.check_path(".gitignore", "Edit").is_blocked());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_blocked() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        fs::create_dir(&project).unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, project.join("link")).unwrap();

        let checker = PathChecker {
            roots: vec![fs::canonicalize(&project).unwrap()],
            ..checker(&project)
        };
        let decision = checker.check_path("link/payload.txt", "Write");
        assert!(decision.is_blocked());
        assert!(decision.reason().unwrap().contains("outside the permitted roots"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_protected_path_is_blocked() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("/etc", dir.path().join("etc-link")).unwrap();
        let decision = checker(dir.path()).check_path("etc-link/hosts", "Write");
        assert!(decision.is_blocked());
        assert!(decision.reason().unwrap().contains("Protected path"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_followed() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("/etc/rusty-guard-missing", dir.path().join("dangling")).unwrap();
        let decision = checker(dir.path()).check_path("dangling", "Write");
        assert!(decision.is_blocked());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_directory_then_parent_still_follows_links() {
        let dir = TempDir::new().unwrap();
        let (project, checker) = narrowed(&dir);
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, project.join("link")).unwrap();

        assert_eq!(checker.resolve("nope/../link/x.txt"), checker.resolve("link/x.txt"));
        for raw in ["nope/../link/x.txt", "a/b/../../link/x.txt", "./nope/./../link/x.txt"] {
            let decision = checker.check_path(raw, "Write");
            assert!(decision.is_blocked(), "{raw}");
            assert!(decision.reason().unwrap().contains("outside the permitted roots"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_parent_of_symlinked_directory_is_physical() {
        let dir = TempDir::new().unwrap();
        let (project, checker) = narrowed(&dir);
        let nested = dir.path().join("outside").join("nested");
        fs::create_dir_all(&nested).unwrap();
        std::os::unix::fs::symlink(&nested, project.join("deep")).unwrap();

        // The kernel resolves `deep/..` to `outside`, not to the project.
        let decision = checker.check_path("deep/../x.txt", "Write");
        assert!(decision.is_blocked());
    }

    #[test]
    fn test_gate_state_is_protected() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        fs::create_dir(&project).unwrap();
        let custom_log = dir.path().join("logs").join("guard.log");
        let checker = PathChecker::new(&GateConfig {
            audit_log: Some(custom_log.clone()),
            ..config(&project)
        })
        .unwrap();

        let custom = custom_log.to_string_lossy().into_owned();
        let backup = format!("{custom}.1");
        let lock = format!("{custom}.lock");
        for raw in [
            ".rusty-guard.json",
            ".rusty-guard/audit.log",
            ".rusty-guard/anything",
            "sub/../.rusty-guard.json",
            custom.as_str(),
            backup.as_str(),
            lock.as_str(),
        ] {
            let decision = checker.check_path(raw, "Write");
            assert!(decision.is_blocked(), "expected block: {raw}");
            assert!(
                decision.reason().unwrap().contains("gate configuration or audit log"),
                "{raw}"
            );
        }
        assert!(!checker.check_path(".rusty-guard-notes.md", "Write").is_blocked());
    }

    #[test]
    fn test_explicit_config_file_is_protected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("shared-guard.json");
        let checker = PathChecker::new(&GateConfig {
            config_path: Some(file.clone()),
            ..config(dir.path())
        })
        .unwrap();
        assert!(checker.check_path(&file.to_string_lossy(), "Edit").is_blocked());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_still_decides() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let checker = checker(dir.path());
        let decision = checker.check_path("locked/inner/file.txt", "Write");
        let resolved = checker.resolve("locked/inner/file.txt");

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(decision.verdict(), Verdict::Allow);
        assert_eq!(resolved, checker.project_root().join("locked/inner/file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_falls_back_to_lexical_path() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(dir.path().join("b"), dir.path().join("a")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("b")).unwrap();

        let checker = checker(dir.path());
        assert_eq!(checker.resolve("a/x.txt"), checker.project_root().join("a").join("x.txt"));
        let decision = checker.check_path("a/x.txt", "Write");
        assert_eq!(decision.verdict(), Verdict::Allow);
    }

    #[cfg(unix)]
    #[test]
    fn test_long_symlink_chain_exceeds_hop_limit() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("l0")).unwrap();
        for i in 1..=MAX_SYMLINK_HOPS + 1 {
            std::os::unix::fs::symlink(root.join(format!("l{}", i - 1)), root.join(format!("l{i}")))
                .unwrap();
        }

        let checker = checker(root);
        let last = format!("l{}/x.txt", MAX_SYMLINK_HOPS + 1);
        assert_eq!(checker.resolve(&last), checker.project_root().join(&last));
        assert_eq!(checker.resolve("l3/x.txt"), checker.project_root().join("real").join("x.txt"));
        assert_eq!(checker.check_path(&last, "Write").verdict(), Verdict::Allow);
    }

    #[test]
    fn test_sensitive_file_warns() {
        let dir = TempDir::new().unwrap();
        let decision = checker(dir.path()).check_path("project/.env", "Write");
        assert_eq!(decision.verdict(), Verdict::Allow);
        assert_eq!(
            decision.warnings(),
            &["Sensitive file (environment variables): project/.env".to_string()]
        );
    }

    #[test]
    fn test_advisory_categories() {
        let dir = TempDir::new().unwrap();
        let checker = checker(dir.path());
        assert!(!checker.check_path("certs/server.pem", "Write").warnings().is_empty());
        assert!(!checker.check_path("config/db_password.txt", "Write").warnings().is_empty());
        assert!(!checker.check_path("Cargo.lock", "Edit").warnings().is_empty());
        assert!(!checker.check_path("node_modules/x/index.js", "Edit").warnings().is_empty());
        assert!(!checker.check_path("README.md", "Edit").warnings().is_empty());
        assert!(checker.check_path("src/envelope.rs", "Edit").warnings().is_empty());
    }

    #[test]
    fn test_large_file_warns() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("big.bin");
        fs::write(&file, vec![0u8; 2048]).unwrap();
        let checker = PathChecker::new(&GateConfig {
            large_file_bytes: 1024,
            ..config(dir.path())
        })
        .unwrap();
        let decision = checker.check_path("big.bin", "Write");
        assert_eq!(decision.verdict(), Verdict::Allow);
        assert!(decision.warnings()[0].starts_with("Large file modification"));
    }

    #[test]
    fn test_structural_failures_block() {
        let dir = TempDir::new().unwrap();
        let checker = checker(dir.path());
        assert!(checker.check_path("", "Write").is_blocked());
        assert!(checker.check_path("a\0b", "Write").is_blocked());
        assert!(checker.check_path("a\nb", "Write").is_blocked());
        assert!(checker.check_path(&"a".repeat(5000), "Write").is_blocked());
    }

    #[test]
    fn test_lexical_clean() {
        assert_eq!(lexical_clean(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(lexical_clean(Path::new("/../x")), PathBuf::from("/x"));
    }
}
