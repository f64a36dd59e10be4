//! Infrastructure layer: concrete collaborators and HTTP DTOs.

pub mod dto;
pub mod notification;
pub mod repository;
