mod connection;
mod replication;
mod test_utils;
