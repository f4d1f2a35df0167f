/*!
Users and the Student and Teacher profiles that hang off of them.
*/
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use serde::Serialize;
use time::{Date, PrimitiveDateTime};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Teacher, Role::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin   => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Also accepts the Spanish role names older data was stored with.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin"                  => Ok(Role::Admin),
            "teacher" | "profesor"   => Ok(Role::Teacher),
            "student" | "estudiante" => Ok(Role::Student),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub registered: PrimitiveDateTime,
    pub active: bool,
}

impl User {
    pub fn check_password(&self, password: &str) -> bool {
        verify_password(&self.password_hash, password)
    }
}

/// Everything needed to insert a `User`; the store assigns the id and
/// registration time.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Student {
    pub id: i64,
    pub user_id: i64,
    pub level_id: i64,
    pub birth: Date,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Teacher {
    pub id: i64,
    pub user_id: i64,
    pub subject: String,
    pub level_id: Option<i64>,
}

/// Hash `password` into a PHC string, salt included.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Unable to hash password: {}", &e))
}

/// Check `password` against a PHC string produced by `hash_password()`.
///
/// A malformed hash never verifies.
pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(e) => {
            log::error!("Stored password hash is malformed: {}", &e);
            return false;
        },
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
