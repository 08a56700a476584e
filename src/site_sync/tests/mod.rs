mod sync_sm;
