//! Infrastructure 層
//!
//! ドメイン層が定義する trait の実装（キャッシュ・永続ストア）と、
//! クライアントとやり取りする DTO を提供します。

pub mod cache;
pub mod dto;
pub mod repository;
