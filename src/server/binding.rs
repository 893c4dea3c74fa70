use dashmap::DashMap;
use uuid::Uuid;

// The server-wide (session id -> username) table.
//
// Identity is bound strictly per session: entries are written by the PASS
// handler after a successful login and erased when the control channel goes
// away. Nothing in the engine may keep a "last authenticated user" anywhere
// else; concurrent logins must never be able to observe each other's
// binding.
#[derive(Debug, Default)]
pub struct SessionBindings {
    inner: DashMap<Uuid, String>,
}

impl SessionBindings {
    pub fn new() -> Self {
        SessionBindings { inner: DashMap::new() }
    }

    // Binds a session to a username. A re-login on the same control
    // connection simply overwrites.
    pub fn bind(&self, session_id: Uuid, username: &str) {
        self.inner.insert(session_id, username.to_string());
    }

    pub fn clear(&self, session_id: Uuid) {
        self.inner.remove(&session_id);
    }

    pub fn username(&self, session_id: Uuid) -> Option<String> {
        self.inner.get(&session_id).map(|entry| entry.value().clone())
    }

    // Number of currently bound sessions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bindings_are_isolated_per_session() {
        let bindings = SessionBindings::new();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();

        bindings.bind(s1, "u1");
        bindings.bind(s2, "u2");

        assert_eq!(bindings.username(s1).as_deref(), Some("u1"));
        assert_eq!(bindings.username(s2).as_deref(), Some("u2"));

        bindings.clear(s1);
        assert_eq!(bindings.username(s1), None);
        assert_eq!(bindings.username(s2).as_deref(), Some("u2"));
        assert_eq!(bindings.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_logins_never_bleed() {
        use std::sync::Arc;

        let bindings = Arc::new(SessionBindings::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let bindings = Arc::clone(&bindings);
            tasks.push(tokio::spawn(async move {
                let id = Uuid::new_v4();
                let name = format!("user-{}", i);
                bindings.bind(id, &name);
                assert_eq!(bindings.username(id).as_deref(), Some(name.as_str()));
                bindings.clear(id);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(bindings.len(), 0);
    }
}
