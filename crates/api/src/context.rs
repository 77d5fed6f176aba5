use clinicflow_auth::Role;
use clinicflow_core::UserId;

/// Authenticated staff member acting on a request.
///
/// Every workflow operation records this user as its actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    user_id: UserId,
    name: Option<String>,
    roles: Vec<Role>,
}

impl ActorContext {
    pub fn new(user_id: UserId, name: Option<String>, roles: Vec<Role>) -> Self {
        Self { user_id, name, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
