// crates/devdash-server/src/signals/files.rs
// Filesystem checks: marker files, manifests, env keys, source walk

use super::{Declared, Signal, SignalSink, SourceStats};
use crate::config::ignore::should_skip;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Manifest file -> language
const LANGUAGE_INDICATORS: &[(&str, &str)] = &[
    ("package.json", "JavaScript/TypeScript"),
    ("pyproject.toml", "Python"),
    ("setup.py", "Python"),
    ("requirements.txt", "Python"),
    ("Cargo.toml", "Rust"),
    ("go.mod", "Go"),
    ("Gemfile", "Ruby"),
    ("build.gradle", "Java/Kotlin"),
    ("pom.xml", "Java"),
    ("mix.exs", "Elixir"),
    ("Package.swift", "Swift"),
    ("composer.json", "PHP"),
    ("index.html", "HTML/CSS"),
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "ts", "tsx", "js", "jsx", "rs", "go", "rb", "java", "kt", "ex", "exs", "swift", "php",
    "c", "cpp", "h",
];

const TEST_DIRS: &[&str] = &[
    "tests",
    "test",
    "__tests__",
    "spec",
    "src/tests",
    "src/__tests__",
];

const README_FILES: &[&str] = &["README.md", "readme.md"];
const DOCKER_FILES: &[&str] = &[
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
];
const CI_PATHS: &[&str] = &[
    ".github/workflows",
    ".circleci",
    ".travis.yml",
    ".gitlab-ci.yml",
];
const DEPLOY_FILES: &[&str] = &["fly.toml", "vercel.json", "netlify.toml"];
const LICENSE_FILES: &[&str] = &["LICENSE", "LICENSE.md"];

/// Lockfile -> package manager, first match wins
const LOCKFILES: &[(&str, &str)] = &[
    ("pnpm-lock.yaml", "pnpm"),
    ("package-lock.json", "npm"),
    ("yarn.lock", "yarn"),
    ("bun.lockb", "bun"),
    ("Cargo.lock", "cargo"),
    ("uv.lock", "uv"),
    ("poetry.lock", "poetry"),
    ("Pipfile.lock", "pipenv"),
];

const LINTER_FILES: &[&str] = &[
    ".eslintrc",
    ".eslintrc.js",
    ".eslintrc.json",
    ".eslintrc.yml",
    "eslint.config.js",
    "eslint.config.mjs",
    "eslint.config.ts",
    ".prettierrc",
    ".prettierrc.js",
    ".prettierrc.json",
    "biome.json",
    "biome.jsonc",
    ".flake8",
    ".pylintrc",
    "pyproject.toml",
    ".rubocop.yml",
    "rustfmt.toml",
];

const JS_FRAMEWORKS: &[(&str, &str)] = &[
    ("next", "nextjs"),
    ("react", "react"),
    ("vue", "vue"),
    ("@angular/core", "angular"),
    ("express", "express"),
    ("fastify", "fastify"),
    ("svelte", "svelte"),
    ("nuxt", "nuxt"),
    ("@remix-run/react", "remix"),
    ("gatsby", "gatsby"),
];
const RUST_FRAMEWORKS: &[(&str, &str)] = &[
    ("axum", "axum"),
    ("actix-web", "actix"),
    ("rocket", "rocket"),
    ("warp", "warp"),
];
const PYTHON_FRAMEWORKS: &[&str] = &["fastapi", "django", "flask", "starlette"];

/// npm package (exact, or scope prefix) -> service
const SERVICE_DEPS: &[(&str, &str)] = &[
    ("@supabase/supabase-js", "supabase"),
    ("posthog-js", "posthog"),
    ("posthog-node", "posthog"),
    ("stripe", "stripe"),
    ("firebase", "firebase"),
    ("firebase-admin", "firebase"),
    ("@aws-sdk", "aws"),
    ("@prisma/client", "prisma"),
    ("mongoose", "mongodb"),
    ("@sentry", "sentry"),
];

const ENV_FILES: &[&str] = &[".env", ".env.local", ".env.development"];
const ENV_KEY_PREFIXES: &[(&str, &str)] = &[
    ("SUPABASE_", "supabase"),
    ("POSTHOG_", "posthog"),
    ("NEXT_PUBLIC_POSTHOG", "posthog"),
    ("STRIPE_", "stripe"),
    ("FIREBASE_", "firebase"),
    ("AWS_", "aws"),
    ("DATABASE_URL", "database"),
    ("SENTRY_", "sentry"),
    ("OPENAI_", "openai"),
    ("ANTHROPIC_", "anthropic"),
];

fn any_exists(root: &Path, names: &[&str]) -> bool {
    names.iter().any(|n| root.join(n).exists())
}

fn read_json(root: &Path, name: &str) -> Option<serde_json::Value> {
    let raw = fs::read_to_string(root.join(name)).ok()?;
    serde_json::from_str(&raw).ok()
}

fn read_toml(root: &Path, name: &str) -> Option<toml::Value> {
    let raw = fs::read_to_string(root.join(name)).ok()?;
    toml::from_str(&raw).ok()
}

/// Names under `dependencies` and `devDependencies` of a package.json
fn js_dependencies(pkg: &serde_json::Value) -> Vec<String> {
    ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|k| pkg.get(*k).and_then(|v| v.as_object()))
        .flat_map(|deps| deps.keys().cloned())
        .collect()
}

/// Run the cheap marker checks. Returns false once the sink closed.
pub fn collect_markers(root: &Path, sink: &SignalSink) -> bool {
    let package_json = read_json(root, "package.json");

    // filesystem reads stay outside `record`; the sink lock never waits on I/O
    let readme = any_exists(root, README_FILES);
    let license = any_exists(root, LICENSE_FILES);
    let docker = any_exists(root, DOCKER_FILES);
    let ci = any_exists(root, CI_PATHS);
    let deployment = any_exists(root, DEPLOY_FILES);
    let linter = any_exists(root, LINTER_FILES);
    let flags = sink.record(|s| {
        s.readme = Signal::Present(readme);
        s.license = Signal::Present(license);
        s.docker = Signal::Present(docker);
        s.ci = Signal::Present(ci);
        s.deployment = Signal::Present(deployment);
        s.linter = Signal::Present(linter);
    });
    if !flags {
        return false;
    }

    let tests = detect_tests(root);
    if !sink.record(|s| s.tests = Signal::Present(tests)) {
        return false;
    }

    let manager = detect_package_manager(root);
    let lockfile = sink.record(|s| {
        s.lockfile = Signal::Present(manager.is_some());
        s.package_manager = Signal::Present(manager.map(str::to_string));
    });
    if !lockfile {
        return false;
    }

    let languages = detect_languages(root);
    if !sink.record(|s| s.languages = Signal::Present(languages)) {
        return false;
    }

    let framework = detect_framework(root, package_json.as_ref());
    if !sink.record(|s| s.framework = Signal::Present(framework)) {
        return false;
    }

    let services = detect_services(root, package_json.as_ref());
    if !sink.record(|s| s.services = Signal::Present(services)) {
        return false;
    }

    let declared = detect_declared(root, package_json.as_ref());
    sink.record(|s| s.declared = Signal::Present(declared))
}

fn detect_tests(root: &Path) -> bool {
    if TEST_DIRS.iter().any(|d| root.join(d).is_dir()) {
        return true;
    }
    // Any root entry mentioning "test" (test_*.py, vitest.config.ts, ...)
    fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.file_name().to_string_lossy().to_lowercase().contains("test"))
        })
        .unwrap_or(false)
}

fn detect_package_manager(root: &Path) -> Option<&'static str> {
    LOCKFILES
        .iter()
        .find(|(file, _)| root.join(file).exists())
        .map(|(_, manager)| *manager)
}

fn detect_languages(root: &Path) -> Vec<String> {
    let mut languages = BTreeSet::new();
    for (file, language) in LANGUAGE_INDICATORS {
        if root.join(file).exists() {
            languages.insert(language.to_string());
        }
    }
    if root.join("tsconfig.json").exists() {
        languages.insert("TypeScript".to_string());
    }
    languages.into_iter().collect()
}

fn detect_framework(root: &Path, package_json: Option<&serde_json::Value>) -> Option<String> {
    if let Some(pkg) = package_json {
        let deps = js_dependencies(pkg);
        if let Some((_, name)) = JS_FRAMEWORKS
            .iter()
            .find(|(dep, _)| deps.iter().any(|d| d == dep))
        {
            return Some(name.to_string());
        }
    }

    if let Some(cargo) = read_toml(root, "Cargo.toml")
        && let Some(deps) = cargo.get("dependencies").and_then(|d| d.as_table())
        && let Some((_, name)) = RUST_FRAMEWORKS.iter().find(|(dep, _)| deps.contains_key(*dep))
    {
        return Some(name.to_string());
    }

    let python_manifests: String = ["pyproject.toml", "requirements.txt"]
        .iter()
        .filter_map(|f| fs::read_to_string(root.join(f)).ok())
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();
    PYTHON_FRAMEWORKS
        .iter()
        .find(|fw| python_manifests.contains(*fw))
        .map(|fw| fw.to_string())
}

fn detect_services(root: &Path, package_json: Option<&serde_json::Value>) -> Vec<String> {
    let mut services = BTreeSet::new();

    if let Some(pkg) = package_json {
        for dep in js_dependencies(pkg) {
            for (pattern, service) in SERVICE_DEPS {
                if dep == *pattern || dep.starts_with(&format!("{pattern}/")) {
                    services.insert(service.to_string());
                }
            }
        }
    }

    // Keys only; values are never read into memory past this loop
    for env_file in ENV_FILES {
        let Ok(content) = fs::read_to_string(root.join(env_file)) else {
            continue;
        };
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let key = trimmed.split('=').next().unwrap_or_default().trim();
            for (prefix, service) in ENV_KEY_PREFIXES {
                if key.starts_with(prefix) {
                    services.insert(service.to_string());
                }
            }
        }
    }

    services.into_iter().collect()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Self-declared name and description from the first manifest that has one
fn detect_declared(root: &Path, package_json: Option<&serde_json::Value>) -> Declared {
    let mut declared = Declared::default();

    if let Some(pkg) = package_json {
        declared.name = non_empty(pkg.get("name").and_then(|v| v.as_str()));
        declared.description = non_empty(pkg.get("description").and_then(|v| v.as_str()));
    }

    let tables = [
        read_toml(root, "Cargo.toml").and_then(|t| t.get("package").cloned()),
        read_toml(root, "pyproject.toml").and_then(|t| {
            t.get("project")
                .cloned()
                .or_else(|| t.get("tool")?.get("poetry").cloned())
        }),
    ];
    for table in tables.iter().flatten() {
        if declared.name.is_none() {
            declared.name = non_empty(table.get("name").and_then(|v| v.as_str()));
        }
        if declared.description.is_none() {
            declared.description = non_empty(table.get("description").and_then(|v| v.as_str()));
        }
    }

    declared
}

/// Walk source files counting TODO/FIXME lines and total lines.
///
/// Stops at the first closed-sink check; partial counts are discarded.
pub fn collect_source_stats(root: &Path, sink: &SignalSink) -> bool {
    let mut stats = SourceStats::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !should_skip(&e.file_name().to_string_lossy())
        });

    for (i, entry) in walker.flatten().enumerate() {
        if i % 64 == 0 && sink.is_closed() {
            debug!(root = %root.display(), "Source walk abandoned");
            return false;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let is_source = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));
        if !is_source {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        for line in content.lines() {
            stats.loc += 1;
            if line.contains("TODO") {
                stats.todo += 1;
            }
            if line.contains("FIXME") {
                stats.fixme += 1;
            }
        }
    }

    sink.record(|s| s.source_stats = Signal::Present(stats))
}
