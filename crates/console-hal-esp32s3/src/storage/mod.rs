pub mod backup_registers;
