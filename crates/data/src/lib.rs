pub mod csv_export;
pub mod database;

pub use csv_export::CsvExporter;
pub use database::PgSnapshotSource;
