//! Configuration types for output triggers and their actions.

use serde::{Deserialize, Serialize};

/// How a trigger's `pattern` text is interpreted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The pattern is a regular expression, compiled with multi-line and
    /// dot-matches-newline semantics.
    Regex,
    /// The pattern is human-readable text. Literal characters are escaped,
    /// whitespace runs tolerate any amount of whitespace, and `(a|b)` groups
    /// are kept as alternations.
    #[default]
    PlainText,
    /// The pattern is a boolean condition over session variables, e.g.
    /// `status == "waiting" && !busy`. Evaluated after every chunk instead of
    /// being matched against output.
    Variable,
}

impl MatchMode {
    /// All available modes for UI dropdowns
    pub fn all() -> &'static [MatchMode] {
        &[Self::Regex, Self::PlainText, Self::Variable]
    }

    /// Human-readable display name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Regex => "Regex",
            Self::PlainText => "Plain Text",
            Self::Variable => "Variable Condition",
        }
    }

    /// True for the modes that match against terminal output.
    pub fn is_text(self) -> bool {
        !matches!(self, Self::Variable)
    }
}

/// Copies one capture group of a match into a session variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableMapping {
    /// Variable name, referenced elsewhere as `%name`.
    pub name: String,
    /// 1-based capture group index.
    pub group: usize,
    /// Optional value template. The marker `{}` is replaced by the raw capture;
    /// without a template the capture is stored verbatim.
    #[serde(default)]
    pub template: Option<String>,
}

/// Marker token substituted with the raw capture inside a [`VariableMapping`] template.
pub const CAPTURE_MARKER: &str = "{}";

impl VariableMapping {
    /// Store capture `group` verbatim as `name`.
    pub fn capture(name: impl Into<String>, group: usize) -> Self {
        Self {
            name: name.into(),
            group,
            template: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Produce the stored value for a raw capture.
    pub fn render(&self, capture: &str) -> String {
        match &self.template {
            Some(template) => template.replace(CAPTURE_MARKER, capture),
            None => capture.to_string(),
        }
    }
}

/// Severity attached to a trigger notification.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifySeverity {
    #[default]
    Info,
    Warning,
    Error,
}

/// Status flag a trigger can set on its session (tab badge / attention dot).
///
/// Precedence between competing tags is decided by the host, not the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStateTag {
    /// The session wants the user to look at it.
    NeedsAttention,
    /// The program in the session is asking a question.
    Question,
    /// The program is busy.
    Working,
    /// Nothing pending.
    Idle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerActionConfig {
    /// Write `command` (after `%variable` interpolation) plus a newline to the
    /// session's input.
    SendText { command: String },
    /// Raise a notification. `title` and `message` accept `%title`, `%tab`,
    /// `%display` and any `%variable`.
    Notify {
        title: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        severity: NotifySeverity,
    },
    /// Set a status flag on the session.
    SetSessionState { state: SessionStateTag },
    /// Remember the session's working directory / remote session so it can be
    /// reconnected automatically. `command` overrides the command recorded for
    /// the resume; when absent the current foreground command is used.
    ArmAutoResume {
        #[serde(default)]
        command: Option<String>,
    },
}

impl TriggerActionConfig {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendText { .. } => "send_text",
            Self::Notify { .. } => "notify",
            Self::SetSessionState { .. } => "set_session_state",
            Self::ArmAutoResume { .. } => "arm_auto_resume",
        }
    }
}

/// A trigger definition that matches terminal output (or variable state) and
/// fires actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerConfig {
    /// Stable identifier; keys cooldown, dedup and transition state.
    pub id: String,
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub mode: MatchMode,
    /// Minimum seconds between two firings for the same session.
    #[serde(default = "crate::defaults::cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub variables: Vec<VariableMapping>,
    #[serde(default)]
    pub actions: Vec<TriggerActionConfig>,
    /// Workspace ids this trigger is limited to. Empty means every workspace.
    #[serde(default)]
    pub workspaces: Vec<String>,
    #[serde(default = "crate::defaults::bool_true")]
    pub enabled: bool,
}

impl TriggerConfig {
    /// Create an enabled trigger with no cooldown, mappings, actions or scope.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        pattern: impl Into<String>,
        mode: MatchMode,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pattern: pattern.into(),
            mode,
            cooldown_secs: 0,
            variables: Vec::new(),
            actions: Vec::new(),
            workspaces: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_cooldown(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    pub fn with_variable(mut self, mapping: VariableMapping) -> Self {
        self.variables.push(mapping);
        self
    }

    pub fn with_action(mut self, action: TriggerActionConfig) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspaces.push(workspace_id.into());
        self
    }

    /// Whether this trigger applies to a session in `workspace_id`.
    ///
    /// Unscoped triggers apply everywhere. A session with no known workspace
    /// only sees unscoped triggers.
    pub fn applies_to_workspace(&self, workspace_id: Option<&str>) -> bool {
        if self.workspaces.is_empty() {
            return true;
        }
        workspace_id.is_some_and(|ws| self.workspaces.iter().any(|w| w == ws))
    }

    /// Check the rule for structural problems that would make it meaningless.
    ///
    /// Pattern syntax is not checked here; an unparsable pattern is skipped by
    /// the engine at runtime.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err(format!("trigger '{}' has an empty id", self.name));
        }
        if self.pattern.trim().is_empty() {
            return Err(format!("trigger '{}' has an empty pattern", self.id));
        }
        if self.mode == MatchMode::Variable && !self.variables.is_empty() {
            return Err(format!(
                "trigger '{}' is a variable condition and cannot extract variables",
                self.id
            ));
        }
        for mapping in &self.variables {
            if mapping.group == 0 {
                return Err(format!(
                    "trigger '{}' maps variable '{}' from group 0; groups start at 1",
                    self.id, mapping.name
                ));
            }
            if !is_variable_name(&mapping.name) {
                return Err(format!(
                    "trigger '{}' has invalid variable name '{}'",
                    self.id, mapping.name
                ));
            }
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the names `%name` references can reach.
fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
