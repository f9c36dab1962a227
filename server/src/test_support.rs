#![allow(dead_code)]

use std::sync::Arc;

use lessonroom_core::{
    config::AppConfig,
    identity::UserProfile,
    memory::{InMemoryDirectory, InMemoryRoomService},
};

use crate::state::{AppState, Backends, build_state};

pub(crate) struct TestEnv {
    pub(crate) state: AppState,
    pub(crate) rooms: Arc<InMemoryRoomService>,
    pub(crate) directory: Arc<InMemoryDirectory>,
    pub(crate) owner: UserProfile,
    pub(crate) editor: UserProfile,
    pub(crate) viewer: UserProfile,
    pub(crate) outsider: UserProfile,
}

impl TestEnv {
    /// Bearer header value for a seeded user; the session token is
    /// `session-<user id>`.
    pub(crate) fn bearer(&self, user: &UserProfile) -> String {
        format!("Bearer session-{}", user.id)
    }
}

pub(crate) fn setup_env() -> TestEnv {
    let rooms = Arc::new(InMemoryRoomService::new());
    let directory = Arc::new(InMemoryDirectory::new());

    let owner = seed_user(&directory, "user_owner", "Olga Owner", "olga@school.edu");
    let editor = seed_user(&directory, "user_editor", "Eli Editor", "eli@school.edu");
    let viewer = seed_user(&directory, "user_viewer", "Vera Viewer", "vera@school.edu");
    let outsider = seed_user(&directory, "user_outsider", "Oscar Outsider", "oscar@school.edu");

    let mut config = AppConfig::default();
    config.notifications.retry_backoff_ms = 1;
    let state = build_state(
        Backends::in_memory(rooms.clone(), directory.clone()),
        &config,
    );

    TestEnv {
        state,
        rooms,
        directory,
        owner,
        editor,
        viewer,
        outsider,
    }
}

pub(crate) fn seed_user(
    directory: &InMemoryDirectory,
    id: &str,
    name: &str,
    email: &str,
) -> UserProfile {
    let profile = UserProfile::new(id, name, email, format!("https://avatars.test/{id}.png"));
    directory.insert(profile.clone());
    directory.issue_session(format!("session-{id}"), &profile.id);
    profile
}
