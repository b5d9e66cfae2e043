//! Templates compiled into the binary.

/// Built-in templates as `(name, source)` pairs.
pub(crate) const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "analyze/system",
        include_str!("../templates/analyze/system.j2"),
    ),
    ("analyze/task", include_str!("../templates/analyze/task.j2")),
    (
        "identify/system",
        include_str!("../templates/identify/system.j2"),
    ),
    ("identify/task", include_str!("../templates/identify/task.j2")),
    ("setup/system", include_str!("../templates/setup/system.j2")),
    ("setup/task", include_str!("../templates/setup/task.j2")),
    (
        "mock/github-copilot-completions",
        include_str!("../templates/mock/github-copilot-completions.j2"),
    ),
    (
        "mock/github-copilot-agent",
        include_str!("../templates/mock/github-copilot-agent.j2"),
    ),
    ("mock/devin", include_str!("../templates/mock/devin.j2")),
    ("mock/codex-cli", include_str!("../templates/mock/codex-cli.j2")),
    ("mock/sreagent", include_str!("../templates/mock/sreagent.j2")),
];
