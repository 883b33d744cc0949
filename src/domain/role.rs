//! Role hierarchy.

text_enum! {
    /// Roles in ascending order of privilege.
    pub enum Role {
        User => "user",
        Seller => "seller",
        Moderator => "moderator",
        Admin => "admin",
        SuperAdmin => "super_admin",
    }
}

/// Ordered from least to most privileged. Rank is the index in this array.
const HIERARCHY: [Role; 5] = [
    Role::User,
    Role::Seller,
    Role::Moderator,
    Role::Admin,
    Role::SuperAdmin,
];

impl Role {
    pub fn rank(&self) -> usize {
        HIERARCHY
            .iter()
            .position(|r| r == self)
            .unwrap_or_default()
    }

    pub fn has_at_least(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// Whether an actor holding `self` may manage a user currently at `target`
    /// and move them to `new_role`.
    pub fn can_assign(&self, target: Role, new_role: Role) -> bool {
        self.rank() > target.rank() && self.rank() > new_role.rank()
    }
}
