use std::fmt;
use thiserror::Error;

/// Lifecycle of one package on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstallState {
    #[default]
    NotInstalled,
    Downloading,
    Extracting,
    Installing,
    Installed(String),
    Uninstalling,
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal state change for package: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: InstallState,
    pub to: InstallState,
}

impl InstallState {
    /// An operation is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Downloading | Self::Extracting | Self::Installing | Self::Uninstalling
        )
    }

    pub fn installed_version(&self) -> Option<&str> {
        match self {
            Self::Installed(version) => Some(version),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: &InstallState) -> bool {
        use InstallState::*;
        matches!(
            (self, next),
            (NotInstalled | Installed(_) | Failed(_), Downloading)
                | (Downloading, Extracting)
                | (Extracting, Installing)
                | (Installing, Installed(_))
                | (Installed(_) | Failed(_), Uninstalling)
                | (Uninstalling, NotInstalled)
                | (Downloading | Extracting | Installing | Uninstalling, Failed(_))
        )
    }

    pub fn transition(&self, next: InstallState) -> Result<InstallState, InvalidTransition> {
        if self.can_transition_to(&next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self.clone(),
                to: next,
            })
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => f.write_str("not installed"),
            Self::Downloading => f.write_str("downloading"),
            Self::Extracting => f.write_str("extracting"),
            Self::Installing => f.write_str("installing"),
            Self::Installed(version) => write!(f, "installed ({})", version),
            Self::Uninstalling => f.write_str("uninstalling"),
            Self::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InstallState::*;

    fn installed() -> InstallState {
        Installed("1.0.0".into())
    }

    fn failed() -> InstallState {
        Failed("boom".into())
    }

    #[test]
    fn test_install_path() {
        let mut state = NotInstalled;
        for next in [Downloading, Extracting, Installing, installed()] {
            state = state.transition(next).unwrap();
        }
        assert_eq!(state.installed_version(), Some("1.0.0"));
    }

    #[test]
    fn test_uninstall_path() {
        let state = installed().transition(Uninstalling).unwrap();
        assert_eq!(state.transition(NotInstalled).unwrap(), NotInstalled);
    }

    #[test]
    fn test_reinstall_and_retry() {
        assert!(installed().can_transition_to(&Downloading));
        assert!(failed().can_transition_to(&Downloading));
        assert!(failed().can_transition_to(&Uninstalling));
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for state in [Downloading, Extracting, Installing, Uninstalling] {
            assert!(state.is_active());
            assert!(state.can_transition_to(&failed()), "{state}");
        }
        assert!(!NotInstalled.can_transition_to(&failed()));
        assert!(!installed().can_transition_to(&failed()));
    }

    #[test]
    fn test_illegal_transitions() {
        let illegal = [
            (NotInstalled, Extracting),
            (NotInstalled, installed()),
            (NotInstalled, Uninstalling),
            (Downloading, Installing),
            (Downloading, installed()),
            (Extracting, Downloading),
            (installed(), NotInstalled),
            (Uninstalling, installed()),
            (failed(), installed()),
        ];
        for (from, to) in illegal {
            let err = from.transition(to.clone()).unwrap_err();
            assert_eq!(err, InvalidTransition { from, to });
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(installed().to_string(), "installed (1.0.0)");
        assert_eq!(failed().to_string(), "failed: boom");
        assert_eq!(NotInstalled.to_string(), "not installed");
    }
}
