//! Declarative service definitions and the in-memory registry of them.

use dashmap::DashMap;

/// One step of a saga: the service that owns it, the subject its forward
/// action is published to, and an optional compensating subject.
#[derive(Debug, Clone)]
pub struct ServiceState {
    /// Logical name of the owning service.
    pub service_name: String,
    /// Subject the forward (execute) request is published to.
    pub execute_subject: String,
    /// Subject the compensating (rollback) request is published to.
    /// Empty means this state is not compensatable.
    pub rollback_subject: String,
}

impl ServiceState {
    /// Build a state with both an execute and a rollback subject.
    pub fn new(
        service_name: impl Into<String>,
        execute_subject: impl Into<String>,
        rollback_subject: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            execute_subject: execute_subject.into(),
            rollback_subject: rollback_subject.into(),
        }
    }

    /// Build a state with no compensation step.
    pub fn non_compensatable(
        service_name: impl Into<String>,
        execute_subject: impl Into<String>,
    ) -> Self {
        Self::new(service_name, execute_subject, "")
    }

    /// `true` iff this state can be rolled back.
    pub fn is_compensatable(&self) -> bool {
        !self.rollback_subject.is_empty()
    }
}

/// A declarative, ordered workflow: name, queue-group, states, and an
/// optional explicit rollback ordering.
///
/// Invariant: if `rollback_order` is present it is a subset of state names;
/// states not listed in it are never rolled back.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    /// Name this definition is registered and resolved under.
    pub name: String,
    /// Queue group forward requests are published under.
    pub queue_group: String,
    /// Ordered list of saga steps.
    pub states: Vec<ServiceState>,
    /// Explicit compensation order, by state name. `None` means "reverse of
    /// the executed prefix".
    pub rollback_order: Option<Vec<String>>,
    /// Whether this service accepts new workflow invocations.
    pub active: bool,
}

impl ServiceDefinition {
    /// Build a new, active definition.
    pub fn new(name: impl Into<String>, queue_group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue_group: queue_group.into(),
            states: Vec::new(),
            rollback_order: None,
            active: true,
        }
    }

    /// Append a state to the end of the forward sequence.
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.states.push(state);
        self
    }

    /// Set an explicit rollback ordering.
    pub fn with_rollback_order(mut self, order: Vec<String>) -> Self {
        self.rollback_order = Some(order);
        self
    }

    /// Mark this definition inactive — `ProcessServiceStates` will refuse it.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    fn state(&self, name: &str) -> Option<&ServiceState> {
        self.states.iter().find(|s| s.service_name == name)
    }
}

/// The outcome of a successful (or partially successful, pre-rollback)
/// `ProcessServiceStates` invocation.
#[derive(Debug, Clone)]
pub struct ServiceResult<T> {
    /// The payload carried by the last successful reply.
    pub response_payload: Option<T>,
    /// Names of the states executed, in execution order.
    pub executed_states: Vec<String>,
}

/// In-memory registry of service definitions, resolved by name.
#[derive(Default)]
pub struct ServiceRegistry {
    definitions: DashMap<String, ServiceDefinition>,
}

impl ServiceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a definition under its own name.
    pub fn register(&self, definition: ServiceDefinition) {
        self.definitions
            .insert(definition.name.clone(), definition);
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Option<ServiceDefinition> {
        self.definitions.get(name).map(|d| d.clone())
    }

    /// Build the compensation sequence for `executed_states`, honoring
    /// `rollback_order` when present, else using the reverse of the executed
    /// prefix. States absent from `executed_states` are never included.
    pub fn rollback_sequence(
        definition: &ServiceDefinition,
        executed_states: &[String],
    ) -> Vec<ServiceState> {
        match &definition.rollback_order {
            Some(order) => order
                .iter()
                .filter(|name| executed_states.contains(name))
                .filter_map(|name| definition.state(name).cloned())
                .collect(),
            None => executed_states
                .iter()
                .rev()
                .filter_map(|name| definition.state(name).cloned())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state_definition() -> ServiceDefinition {
        ServiceDefinition::new("svc", "svc")
            .with_state(ServiceState::new("A", "svc.A.exec", "svc.A.rb"))
            .with_state(ServiceState::new("B", "svc.B.exec", "svc.B.rb"))
    }

    #[test]
    fn rollback_sequence_defaults_to_reverse_of_executed() {
        let def = two_state_definition();
        let executed = vec!["A".to_string()];
        let seq = ServiceRegistry::rollback_sequence(&def, &executed);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].service_name, "A");
    }

    #[test]
    fn rollback_sequence_honors_explicit_order_intersected_with_executed() {
        let def = two_state_definition().with_rollback_order(vec!["B".into(), "A".into()]);
        let executed = vec!["A".to_string()];
        let seq = ServiceRegistry::rollback_sequence(&def, &executed);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].service_name, "A");
    }

    #[test]
    fn non_compensatable_state_has_no_rollback_subject() {
        let state = ServiceState::non_compensatable("A", "svc.A.exec");
        assert!(!state.is_compensatable());
    }

    #[test]
    fn registry_round_trips_a_definition() {
        let registry = ServiceRegistry::new();
        registry.register(two_state_definition());
        let resolved = registry.get("svc").expect("registered");
        assert_eq!(resolved.states.len(), 2);
    }
}
