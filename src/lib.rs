pub mod schedule;
pub mod storage;
pub mod utils;

use std::env;
use once_cell::sync::Lazy;

const RENTOPS_SQLITE_PATH: &str = "sqlite://./rentops_data/database/tasks.db?mode=rwc";

pub static SQLITE_PATH: Lazy<String> = Lazy::new(|| {
    match env::var("RENTOPS_SQLITE_PATH") {
        Ok(path) => path,
        Err(_) => {
            dotenv::var("RENTOPS_SQLITE_PATH").unwrap_or_else(|_| RENTOPS_SQLITE_PATH.to_string())
        }
    }
});

pub fn init_env() {
    dotenv::dotenv().ok();

    // make sure the database directory exists before the pool connects
    if let Some(db_path) = SQLITE_PATH.strip_prefix("sqlite://") {
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(dir) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| {
                eprintln!("Failed to create database directory: {}", e);
            });
        }
    }
}
