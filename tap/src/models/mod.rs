mod record;
mod report;
mod schema;
mod window;

pub use record::{OutputRecord, RawRow, ReportPage};
pub use report::ReportDefinition;
pub use schema::{
    Catalog, FieldRole, FieldType, RECORD_HASH, RECORD_TIMESTAMP, REPORT_END_DATE,
    REPORT_START_DATE, SchemaField, StreamSchema,
};
pub use window::DateWindow;
