// src/models/mod.rs

pub mod attempt;
pub mod branch;
pub mod leaderboard;
pub mod mock_test;
pub mod notification;
pub mod question;
pub mod user;
