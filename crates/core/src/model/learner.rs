use serde::{Deserialize, Serialize};

use crate::model::LearnerId;

/// Role reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

/// The current learner as seen by the ledger. Never mutated by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learner {
    id: LearnerId,
    role: Role,
}

impl Learner {
    #[must_use]
    pub fn new(id: LearnerId, role: Role) -> Self {
        Self { id, role }
    }

    #[must_use]
    pub fn student(id: LearnerId) -> Self {
        Self::new(id, Role::Student)
    }

    #[must_use]
    pub fn id(&self) -> &LearnerId {
        &self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
