//! Pod and container status plus the translation from provider states

/// The status of a pod or one of its containers
///
/// Provider-native lifecycle states collapse onto this enum with a fixed
/// table; anything unrecognized or missing is `Unknown`, never an error.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodStatus {
    /// The pod is being provisioned or activated
    Starting,
    /// The pod's containers are running
    Running,
    /// The pod is draining or deprovisioning
    Stopping,
    /// The pod's containers have stopped
    Stopped,
    /// The pod and its owned resources have been reclaimed
    Deleted,
    /// The provider reported a state we do not recognize
    Unknown,
}

impl PodStatus {
    /// Translate a provider lifecycle state into a pod status
    ///
    /// # Arguments
    ///
    /// * `state` - The provider state to translate
    pub fn translate<S: AsRef<str>>(state: Option<S>) -> Self {
        match state {
            Some(state) => match state.as_ref() {
                "PROVISIONING" | "PENDING" | "ACTIVATING" => PodStatus::Starting,
                "RUNNING" => PodStatus::Running,
                "DEACTIVATING" | "STOPPING" | "DEPROVISIONING" => PodStatus::Stopping,
                "STOPPED" => PodStatus::Stopped,
                _ => PodStatus::Unknown,
            },
            None => PodStatus::Unknown,
        }
    }

    /// Whether a pod in this status has already stopped running
    pub fn is_stopped(self) -> bool {
        matches!(self, PodStatus::Stopped | PodStatus::Deleted)
    }
}

impl std::fmt::Display for PodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PodStatus::Starting => "Starting",
            PodStatus::Running => "Running",
            PodStatus::Stopping => "Stopping",
            PodStatus::Stopped => "Stopped",
            PodStatus::Deleted => "Deleted",
            PodStatus::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// The status of a single container in a pod
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatusInfo {
    /// The name of this container
    pub name: String,
    /// The status of this container
    pub status: PodStatus,
}

/// The status of a pod and each of its containers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PodStatusInfo {
    /// The status of the pod as a whole
    pub status: PodStatus,
    /// The status of each container in the pod
    pub containers: Vec<ContainerStatusInfo>,
}

impl PodStatusInfo {
    /// Build a starting status for the given container names
    ///
    /// # Arguments
    ///
    /// * `names` - The names of the containers in this pod
    pub fn starting<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        let containers = names
            .into_iter()
            .map(|name| ContainerStatusInfo {
                name: name.to_owned(),
                status: PodStatus::Starting,
            })
            .collect();
        PodStatusInfo {
            status: PodStatus::Starting,
            containers,
        }
    }

    /// Set the pod and every container to the same status
    ///
    /// # Arguments
    ///
    /// * `status` - The status to set
    pub fn set_all(&mut self, status: PodStatus) {
        self.status = status;
        for container in &mut self.containers {
            container.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_table() {
        for state in ["PROVISIONING", "PENDING", "ACTIVATING"] {
            assert_eq!(PodStatus::translate(Some(state)), PodStatus::Starting);
        }
        assert_eq!(PodStatus::translate(Some("RUNNING")), PodStatus::Running);
        for state in ["DEACTIVATING", "STOPPING", "DEPROVISIONING"] {
            assert_eq!(PodStatus::translate(Some(state)), PodStatus::Stopping);
        }
        assert_eq!(PodStatus::translate(Some("STOPPED")), PodStatus::Stopped);
    }

    #[test]
    fn translation_is_total() {
        assert_eq!(PodStatus::translate(None::<&str>), PodStatus::Unknown);
        assert_eq!(PodStatus::translate(Some("")), PodStatus::Unknown);
        assert_eq!(PodStatus::translate(Some("FOO")), PodStatus::Unknown);
        // translation is case sensitive like the provider's states
        assert_eq!(PodStatus::translate(Some("running")), PodStatus::Unknown);
    }

    #[test]
    fn set_all_updates_containers() {
        let mut info = PodStatusInfo::starting(["web", "sidecar"]);
        info.set_all(PodStatus::Stopped);
        assert_eq!(info.status, PodStatus::Stopped);
        assert!(info
            .containers
            .iter()
            .all(|container| container.status == PodStatus::Stopped));
    }
}
