//! Trigger action dispatch.
//!
//! Actions of a fired rule run in order. Each one goes through a collaborator
//! trait; a failure is logged and the remaining actions still run.

use aiterm_config::{NotifySeverity, SessionStateTag, TriggerActionConfig, TriggerConfig};

use super::variables::{VariableStore, interpolate};
use crate::traits::{AutoResumeContext, Collaborators, SessionInfo};

/// Outcome of one action, kept for the per-chunk report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ActionOutcome {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs a rule's actions against one session.
pub struct ActionExecutor<'a> {
    collaborators: &'a Collaborators,
    variables: &'a VariableStore,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(collaborators: &'a Collaborators, variables: &'a VariableStore) -> Self {
        Self {
            collaborators,
            variables,
        }
    }

    pub fn run(&self, trigger: &TriggerConfig, session_id: &str) -> Vec<ActionOutcome> {
        trigger
            .actions
            .iter()
            .map(|action| {
                let error = match self.run_one(trigger, session_id, action) {
                    Ok(()) => None,
                    Err(e) => {
                        log::error!(
                            "Trigger {} action {} failed in session {}: {:#}",
                            trigger.id,
                            action.kind(),
                            session_id,
                            e
                        );
                        crate::debug_error!(
                            "TRIGGER",
                            "action {} failed trigger_id={} session={} error={:#}",
                            action.kind(),
                            trigger.id,
                            session_id,
                            e
                        );
                        Some(format!("{e:#}"))
                    }
                };
                ActionOutcome {
                    kind: action.kind(),
                    error,
                }
            })
            .collect()
    }

    fn run_one(
        &self,
        trigger: &TriggerConfig,
        session_id: &str,
        action: &TriggerActionConfig,
    ) -> anyhow::Result<()> {
        match action {
            TriggerActionConfig::SendText { command } => {
                self.send_text(trigger, session_id, command)
            }
            TriggerActionConfig::Notify {
                title,
                message,
                severity,
            } => self.notify(trigger, session_id, title, message, *severity),
            TriggerActionConfig::SetSessionState { state } => {
                self.set_state(trigger, session_id, *state)
            }
            TriggerActionConfig::ArmAutoResume { command } => {
                self.arm_auto_resume(trigger, session_id, command.as_deref())
            }
        }
    }

    fn send_text(&self, trigger: &TriggerConfig, session_id: &str, command: &str) -> anyhow::Result<()> {
        let text = self.variables.resolve(session_id, command, false);
        log::info!("Trigger {} firing SendText: '{}'", trigger.id, text);
        crate::debug_info!(
            "TRIGGER",
            "AUDIT SendText trigger_id={} session={} text={:?}",
            trigger.id,
            session_id,
            text
        );
        let mut data = text.into_bytes();
        data.push(b'\n');
        self.collaborators.input.write(session_id, &data)
    }

    fn notify(
        &self,
        trigger: &TriggerConfig,
        session_id: &str,
        title: &str,
        message: &str,
        severity: NotifySeverity,
    ) -> anyhow::Result<()> {
        let info = self.collaborators.sessions.session_info(session_id);
        let title = self.resolve_notification(session_id, info.as_ref(), title);
        let body = self.resolve_notification(session_id, info.as_ref(), message);
        log::info!(
            "Trigger {} firing Notify ({:?}): '{}' - '{}'",
            trigger.id,
            severity,
            title,
            body
        );
        self.collaborators
            .notifier
            .dispatch(&title, &body, severity, session_id)
    }

    /// Interpolate a notification template. `%title`, `%tab` and `%display`
    /// name the session; everything else is a trigger variable.
    fn resolve_notification(
        &self,
        session_id: &str,
        info: Option<&SessionInfo>,
        template: &str,
    ) -> String {
        let vars = self.variables.get(session_id);
        interpolate(
            template,
            |name| {
                if let Some(info) = info {
                    match name {
                        "title" => return Some(info.terminal_title.clone().unwrap_or_default()),
                        "tab" => return Some(info.name.clone()),
                        "display" => return Some(info.display_name.clone()),
                        _ => {}
                    }
                }
                vars.and_then(|v| v.get(name)).cloned()
            },
            false,
        )
    }

    fn set_state(
        &self,
        trigger: &TriggerConfig,
        session_id: &str,
        state: SessionStateTag,
    ) -> anyhow::Result<()> {
        log::info!(
            "Trigger {} firing SetSessionState: {:?} on {}",
            trigger.id,
            state,
            session_id
        );
        self.collaborators.state.set_state(session_id, state)
    }

    fn arm_auto_resume(
        &self,
        trigger: &TriggerConfig,
        session_id: &str,
        command: Option<&str>,
    ) -> anyhow::Result<()> {
        let pty = self.collaborators.pty.context(session_id)?;
        let ssh_command = pty
            .foreground_command
            .as_deref()
            .filter(|cmd| is_ssh_command(cmd))
            .map(str::to_string);
        let command = match command {
            Some(template) => Some(self.variables.resolve(session_id, template, true)),
            None if ssh_command.is_none() => pty.foreground_command.clone(),
            None => None,
        };
        let context = AutoResumeContext {
            cwd: pty.cwd,
            ssh_command,
            remote_cwd: pty.remote_cwd,
            command,
        };
        log::info!(
            "Trigger {} arming auto-resume for {}: {:?}",
            trigger.id,
            session_id,
            context
        );
        crate::debug_info!(
            "TRIGGER",
            "AUDIT ArmAutoResume trigger_id={} session={} cwd={:?} ssh={:?} remote_cwd={:?} command={:?}",
            trigger.id,
            session_id,
            context.cwd,
            context.ssh_command,
            context.remote_cwd,
            context.command
        );
        self.collaborators
            .sessions
            .record_auto_resume(session_id, context)
    }
}

/// `ssh` invoked directly (`ssh host`, `/usr/bin/ssh -p 22 host`).
fn is_ssh_command(command: &str) -> bool {
    command
        .split_whitespace()
        .next()
        .and_then(|program| program.rsplit('/').next())
        .is_some_and(|name| name == "ssh")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ssh_command() {
        assert!(is_ssh_command("ssh host"));
        assert!(is_ssh_command("/usr/bin/ssh -p 2222 user@host"));
        assert!(is_ssh_command("ssh"));
        assert!(!is_ssh_command("sshfs host:/ /mnt"));
        assert!(!is_ssh_command("vim ssh.txt"));
        assert!(!is_ssh_command(""));
    }

    #[test]
    fn test_outcome_succeeded() {
        let ok = ActionOutcome {
            kind: "notify",
            error: None,
        };
        assert!(ok.succeeded());
    }
}
