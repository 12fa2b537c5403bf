use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Arrow schema of the `cards` table. `dim` is the embedder's vector width.
pub fn build_cards_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("ordinal", DataType::Int32, false),
		Field::new("card_name", DataType::Utf8, false),
		Field::new("bank", DataType::Utf8, false),
		Field::new("annual_fee", DataType::UInt32, false),
		Field::new("requires_app_switch", DataType::Boolean, false),
		Field::new("app_switch_info", DataType::Utf8, false),
		Field::new("start_date", DataType::Utf8, false),
		Field::new("end_date", DataType::Utf8, false),
		Field::new("notes", DataType::Utf8, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
