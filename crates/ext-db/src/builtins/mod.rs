pub mod dynamodb;
pub mod mongo;
pub mod neo4j;
pub mod redis;
pub mod sql;
