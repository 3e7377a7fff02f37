pub mod test_server {
    use std::sync::Once;

    /// Configures the may runtime once per test binary.
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x10000);
        });
    }
}

pub mod env {
    use std::sync::Mutex;

    use once_cell::sync::Lazy;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    /// Serializes tests that mutate process environment variables.
    pub fn lock() -> &'static Mutex<()> {
        &ENV_LOCK
    }

    /// Set `var` for the duration of `f`, restoring the previous value.
    pub fn with_var<T>(var: &str, value: &std::ffi::OsStr, f: impl FnOnce() -> T) -> T {
        let _guard = lock().lock().unwrap();
        let previous = std::env::var_os(var);
        std::env::set_var(var, value);
        let result = f();
        match previous {
            Some(old) => std::env::set_var(var, old),
            None => std::env::remove_var(var),
        }
        result
    }
}

pub mod panel {
    use std::net::{SocketAddr, TcpListener};
    use std::path::Path;
    use std::sync::Arc;

    use serde_json::Value;
    use tempfile::TempDir;

    use panelforge::api;
    use panelforge::config::{ProjectPaths, ServerConfig};
    use panelforge::generator::scaffold_project;
    use panelforge::resources::ResourceContext;
    use panelforge::server::{AdminServer, ServerHandle};
    use panelforge::store::MemoryStore;

    use super::test_server::setup_may_runtime;

    /// A served admin panel over a scaffolded temp project and an in-memory
    /// store. Dropping it stops the server and removes the project.
    pub struct TestPanel {
        dir: TempDir,
        ctx: Arc<ResourceContext>,
        addr: SocketAddr,
        token: Option<String>,
        handle: Option<ServerHandle>,
        client: reqwest::blocking::Client,
    }

    impl TestPanel {
        pub fn start() -> Self {
            Self::start_with_token(None)
        }

        pub fn start_with_token(token: Option<&str>) -> Self {
            setup_may_runtime();
            let dir = tempfile::tempdir().unwrap();
            let project = ProjectPaths::new(dir.path());
            scaffold_project(&project, false).unwrap();

            // Reserve a free port, then hand it to the server.
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let config = ServerConfig {
                addr: addr.to_string(),
                database_url: "mem:".to_string(),
                admin_token: token.map(str::to_string),
                watch: false,
            };
            let ctx = Arc::new(ResourceContext::for_project(
                project,
                Arc::new(MemoryStore::new()),
            ));
            let server = AdminServer::with_context(Arc::clone(&ctx), config);
            for (prefix, table) in api::core_tables() {
                server.mount(prefix, table);
            }
            server.mount("/api/admin", api::admin_table());
            api::admin::remount_generated(&ctx);

            let handle = server.start().unwrap();
            handle.wait_ready().unwrap();

            Self {
                dir,
                ctx,
                addr,
                token: token.map(str::to_string),
                handle: Some(handle),
                client: reqwest::blocking::Client::new(),
            }
        }

        pub fn ctx(&self) -> &Arc<ResourceContext> {
            &self.ctx
        }

        pub fn project_root(&self) -> &Path {
            self.dir.path()
        }

        pub fn url(&self, path: &str) -> String {
            format!("http://{}{path}", self.addr)
        }

        fn authorize(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
            match &self.token {
                Some(token) => req.bearer_auth(token),
                None => req,
            }
        }

        pub fn get(&self, path: &str) -> (u16, Value) {
            let resp = self
                .authorize(self.client.get(self.url(path)))
                .send()
                .unwrap();
            read_json(resp)
        }

        pub fn get_unauthenticated(&self, path: &str) -> (u16, Value) {
            let resp = self.client.get(self.url(path)).send().unwrap();
            read_json(resp)
        }

        pub fn post(&self, path: &str, body: Value) -> (u16, Value) {
            let resp = self
                .authorize(self.client.post(self.url(path)))
                .json(&body)
                .send()
                .unwrap();
            read_json(resp)
        }

        pub fn put(&self, path: &str, body: Value) -> (u16, Value) {
            let resp = self
                .authorize(self.client.put(self.url(path)))
                .json(&body)
                .send()
                .unwrap();
            read_json(resp)
        }

        pub fn delete(&self, path: &str) -> (u16, Value) {
            let resp = self
                .authorize(self.client.delete(self.url(path)))
                .send()
                .unwrap();
            read_json(resp)
        }
    }

    impl Drop for TestPanel {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }

    fn read_json(resp: reqwest::blocking::Response) -> (u16, Value) {
        let status = resp.status().as_u16();
        let text = resp.text().unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        (status, body)
    }
}
