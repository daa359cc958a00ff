pub mod mock_notes;
