//! Database and database-user bootstrap.
//!
//! All statements use "create if not exists" semantics so a second run
//! against an already bootstrapped server changes nothing. The SQL goes to
//! the client on stdin; the password never reaches argv.
//!
//! A local server is reached as its superuser over the local socket. A
//! remote server is reached with `--host`/`-h` and the client's own
//! credential files (`~/.my.cnf`, `~/.pgpass`).

use crate::command::StepCommand;
use crate::config::{DatabaseEngine, DatabaseSettings};

/// Quote a string literal for MySQL/MariaDB
fn mysql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Quote a string literal for PostgreSQL (standard_conforming_strings)
fn pg_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Creates the database, the user and the grant for one engine.
///
/// `name` and `user` must already have passed
/// [`crate::config::validate_identifier`].
#[derive(Debug, Clone)]
pub struct DatabaseBootstrap {
    pub settings: DatabaseSettings,
}

impl DatabaseBootstrap {
    pub fn new(settings: &DatabaseSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Host part of the MySQL account: local connections stay local
    fn mysql_account_host(&self) -> &str {
        if self.settings.is_local() { "localhost" } else { "%" }
    }

    /// The SQL script fed to the database client
    pub fn sql(&self) -> String {
        let s = &self.settings;
        match s.engine {
            DatabaseEngine::Mysql => {
                let account = format!(
                    "{}@{}",
                    mysql_literal(&s.user),
                    mysql_literal(self.mysql_account_host())
                );
                format!(
                    "CREATE DATABASE IF NOT EXISTS `{db}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;\n\
                     CREATE USER IF NOT EXISTS {account} IDENTIFIED BY {password};\n\
                     GRANT ALL PRIVILEGES ON `{db}`.* TO {account};\n\
                     FLUSH PRIVILEGES;\n",
                    db = s.name,
                    account = account,
                    password = mysql_literal(s.password.expose()),
                )
            }
            DatabaseEngine::Postgres => format!(
                "SELECT format('CREATE ROLE %I LOGIN PASSWORD %L', {user}, {password}) \
                 WHERE NOT EXISTS (SELECT FROM pg_roles WHERE rolname = {user})\\gexec\n\
                 SELECT format('CREATE DATABASE %I OWNER %I', {db}, {user}) \
                 WHERE NOT EXISTS (SELECT FROM pg_database WHERE datname = {db})\\gexec\n",
                user = pg_literal(&s.user),
                password = pg_literal(s.password.expose()),
                db = pg_literal(&s.name),
            ),
        }
    }
}

impl StepCommand for DatabaseBootstrap {
    fn program(&self) -> &'static str {
        match (self.settings.engine, self.settings.is_local()) {
            (DatabaseEngine::Mysql, _) => "mysql",
            (DatabaseEngine::Postgres, true) => "runuser",
            (DatabaseEngine::Postgres, false) => "psql",
        }
    }

    fn to_args(&self) -> Vec<String> {
        let local = self.settings.is_local();
        let host = self.settings.host.clone();
        let mut args: Vec<String> = match (self.settings.engine, local) {
            (DatabaseEngine::Mysql, true) => vec!["--batch".into()],
            (DatabaseEngine::Mysql, false) => vec!["--batch".into(), "--host".into(), host],
            (DatabaseEngine::Postgres, true) => vec!["-u".into(), "postgres".into(), "--".into(), "psql".into()],
            (DatabaseEngine::Postgres, false) => vec![
                "-h".into(),
                host,
                "-U".into(),
                "postgres".into(),
                "-d".into(),
                "postgres".into(),
            ],
        };
        if self.settings.engine == DatabaseEngine::Postgres {
            args.extend(["-v".into(), "ON_ERROR_STOP=1".into(), "--quiet".into()]);
        }
        args
    }

    fn stdin(&self) -> Option<String> {
        Some(self.sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    fn settings(engine: DatabaseEngine) -> DatabaseSettings {
        DatabaseSettings {
            engine,
            host: "127.0.0.1".to_string(),
            name: "modoboa".to_string(),
            user: "modoboa".to_string(),
            password: Secret::new("it's-a-\\secret"),
        }
    }

    #[test]
    fn test_mysql_sql_is_idempotent() {
        let sql = DatabaseBootstrap::new(&settings(DatabaseEngine::Mysql)).sql();
        assert!(sql.contains("CREATE DATABASE IF NOT EXISTS `modoboa`"));
        assert!(sql.contains("CREATE USER IF NOT EXISTS 'modoboa'@'localhost'"));
        assert!(sql.contains("GRANT ALL PRIVILEGES ON `modoboa`.* TO 'modoboa'@'localhost'"));
    }

    #[test]
    fn test_mysql_password_is_escaped() {
        let sql = DatabaseBootstrap::new(&settings(DatabaseEngine::Mysql)).sql();
        assert!(sql.contains("IDENTIFIED BY 'it''s-a-\\\\secret'"));
    }

    #[test]
    fn test_remote_host_uses_wildcard_account() {
        let mut s = settings(DatabaseEngine::Mysql);
        s.host = "10.0.0.5".to_string();
        let sql = DatabaseBootstrap::new(&s).sql();
        assert!(sql.contains("'modoboa'@'%'"));
    }

    #[test]
    fn test_local_clients_use_the_local_server() {
        let mysql = DatabaseBootstrap::new(&settings(DatabaseEngine::Mysql)).to_spec();
        assert_eq!(mysql.command_line(), "mysql --batch");

        let pg = DatabaseBootstrap::new(&settings(DatabaseEngine::Postgres)).to_spec();
        assert_eq!(
            pg.command_line(),
            "runuser -u postgres -- psql -v ON_ERROR_STOP=1 --quiet"
        );
    }

    #[test]
    fn test_remote_clients_target_the_configured_host() {
        let mut s = settings(DatabaseEngine::Mysql);
        s.host = "10.0.0.5".to_string();
        let mysql = DatabaseBootstrap::new(&s).to_spec();
        assert_eq!(mysql.command_line(), "mysql --batch --host 10.0.0.5");

        s.engine = DatabaseEngine::Postgres;
        let pg = DatabaseBootstrap::new(&s).to_spec();
        assert_eq!(
            pg.command_line(),
            "psql -h 10.0.0.5 -U postgres -d postgres -v ON_ERROR_STOP=1 --quiet"
        );
        assert!(!pg.command_line().contains("secret"));
    }

    #[test]
    fn test_postgres_sql_guards_existing_objects() {
        let sql = DatabaseBootstrap::new(&settings(DatabaseEngine::Postgres)).sql();
        assert!(sql.contains("WHERE NOT EXISTS (SELECT FROM pg_roles WHERE rolname = 'modoboa')"));
        assert!(sql.contains("WHERE NOT EXISTS (SELECT FROM pg_database WHERE datname = 'modoboa')"));
        assert!(sql.contains("'it''s-a-\\secret'"));
    }

    #[test]
    fn test_password_stays_off_the_command_line() {
        for engine in [DatabaseEngine::Mysql, DatabaseEngine::Postgres] {
            let spec = DatabaseBootstrap::new(&settings(engine)).to_spec();
            assert!(!spec.command_line().contains("secret"));
            assert!(spec.stdin.as_deref().unwrap_or_default().contains("secret"));
        }
    }

    #[test]
    fn test_spec_is_stable_across_runs() {
        let bootstrap = DatabaseBootstrap::new(&settings(DatabaseEngine::Mysql));
        assert_eq!(bootstrap.to_spec(), bootstrap.to_spec());
    }
}
