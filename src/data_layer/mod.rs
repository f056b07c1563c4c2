pub mod storage;
pub mod swarm;
pub mod watcher;
