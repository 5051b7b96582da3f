use super::*;

/// Build a ROM of `banks` banks where the first byte of each bank holds the
/// bank index, so a read through the switchable window identifies the
/// selected bank.
fn numbered_rom(banks: usize) -> Vec<u8> {
    let mut rom = vec![0; banks * ROM_BANK_SIZE];
    for bank in 0..banks {
        rom[bank * ROM_BANK_SIZE] = bank as u8;
    }
    rom
}

fn header_image(controller: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
    let mut rom = vec![0; (ROM_BANK_SIZE * 2) << rom_size_code];
    rom[0x0147] = controller;
    rom[0x0148] = rom_size_code;
    rom[0x0149] = ram_size_code;
    rom
}

#[test]
fn header_controller_types_map_to_kinds() {
    let cases: &[(u8, MbcKind)] = &[
        (0x00, MbcKind::RomOnly),
        (0x08, MbcKind::RomOnly),
        (0x01, MbcKind::Mbc1Mode16x8),
        (0x03, MbcKind::Mbc1Mode16x8),
        (0x05, MbcKind::Mbc2),
        (0x06, MbcKind::Mbc2),
        (0x0F, MbcKind::Mbc3),
        (0x13, MbcKind::Mbc3),
        (0x19, MbcKind::Mbc5),
        (0x1E, MbcKind::Mbc5),
    ];
    for &(byte, kind) in cases {
        let cartridge = Cartridge::from_image(header_image(byte, 0, 0)).expect("valid image");
        assert_eq!(cartridge.kind(), kind, "type byte {byte:#04X}");
    }
}

#[test]
fn header_errors() {
    assert!(matches!(
        Cartridge::from_image(vec![0; 0x100]),
        Err(CartridgeError::ImageTooShort(0x100))
    ));
    assert!(matches!(
        Cartridge::from_image(header_image(0x20, 0, 0)),
        Err(CartridgeError::UnknownControllerType(0x20))
    ));
    assert!(matches!(
        Cartridge::from_image(header_image(0x00, 0x09, 0)),
        Err(CartridgeError::UnknownRomSize(0x09))
    ));
    assert!(matches!(
        Cartridge::from_image(header_image(0x00, 0, 0x05)),
        Err(CartridgeError::UnknownRamSize(0x05))
    ));

    // Header declares 64 KiB but the image only holds 32 KiB.
    let mut rom = header_image(0x00, 0, 0);
    rom[0x0148] = 0x01;
    assert!(matches!(
        Cartridge::from_image(rom),
        Err(CartridgeError::TruncatedRom {
            expected: 0x10000,
            actual: 0x8000
        })
    ));
}

#[test]
fn mbc2_ignores_the_header_ram_code() {
    let mut rom = header_image(0x06, 0, 0);
    rom[0x0149] = 0x00;
    let cartridge = Cartridge::from_image(rom).expect("valid image");
    // The controller's built-in cells are always present.
    let mut cartridge = cartridge;
    cartridge.store_ram_byte(0xA000, 0x0A);
    assert_eq!(cartridge.load_ram_byte(0xA000), 0x0A);
}

#[test]
fn rom_only_ignores_bank_control_writes() {
    let mut cartridge = Cartridge::with_layout(MbcKind::RomOnly, numbered_rom(2), 0);
    cartridge.store_rom_byte(0x2000, 0x05);
    assert_eq!(cartridge.rom_bank(), 1);
    assert_eq!(cartridge.load_rom_byte(0x0000), 0);
    assert_eq!(cartridge.load_rom_byte(0x4000), 1);
}

#[test]
fn mbc1_16x8_combines_low_and_high_bank_bits() {
    let mut cartridge = Cartridge::with_layout(MbcKind::Mbc1Mode16x8, numbered_rom(64), 1);

    cartridge.store_rom_byte(0x2000, 0x12);
    assert_eq!(cartridge.rom_bank(), 0x12);
    assert_eq!(cartridge.load_rom_byte(0x4000), 0x12);

    // Upper two bits arrive through the second control window.
    cartridge.store_rom_byte(0x4000, 0x01);
    assert_eq!(cartridge.rom_bank(), 0x32);
    assert_eq!(cartridge.load_rom_byte(0x4000), 0x32);

    // The fixed window is unaffected by bank switching.
    assert_eq!(cartridge.load_rom_byte(0x0000), 0);
}

#[test]
fn mbc1_coerces_bank_zero_to_one() {
    let mut cartridge = Cartridge::with_layout(MbcKind::Mbc1Mode16x8, numbered_rom(64), 1);
    cartridge.store_rom_byte(0x2000, 0x00);
    assert_eq!(cartridge.rom_bank(), 1);

    // A value whose low 5 bits are zero coerces too, preserving the high
    // bits.
    cartridge.store_rom_byte(0x4000, 0x01);
    cartridge.store_rom_byte(0x2000, 0x20);
    assert_eq!(cartridge.rom_bank(), 0x21);
}

#[test]
fn mbc1_4x32_selects_ram_banks() {
    let mut cartridge = Cartridge::with_layout(MbcKind::Mbc1Mode4x32, numbered_rom(4), 4);

    cartridge.store_ram_byte(0xA000, 0x11);
    cartridge.store_rom_byte(0x4000, 0x02);
    assert_eq!(cartridge.ram_bank(), 2);
    assert_eq!(cartridge.load_ram_byte(0xA000), 0);

    cartridge.store_ram_byte(0xA000, 0x22);
    cartridge.store_rom_byte(0x4000, 0x00);
    assert_eq!(cartridge.load_ram_byte(0xA000), 0x11);
    cartridge.store_rom_byte(0x4000, 0x02);
    assert_eq!(cartridge.load_ram_byte(0xA000), 0x22);
}

#[test]
fn mbc2_four_bit_bank_and_ram_cells() {
    let mut cartridge = Cartridge::with_layout(MbcKind::Mbc2, numbered_rom(16), 1);

    cartridge.store_rom_byte(0x2000, 0x0F);
    assert_eq!(cartridge.rom_bank(), 0x0F);
    assert_eq!(cartridge.load_rom_byte(0x4000), 0x0F);

    cartridge.store_rom_byte(0x2000, 0x00);
    assert_eq!(cartridge.rom_bank(), 1);

    // RAM cells are 4 bits wide.
    cartridge.store_ram_byte(0xA010, 0xFF);
    assert_eq!(cartridge.load_ram_byte(0xA010), 0x0F);
}

#[test]
fn mbc3_seven_bit_bank_and_ram_select() {
    let mut cartridge = Cartridge::with_layout(MbcKind::Mbc3, numbered_rom(128), 4);

    cartridge.store_rom_byte(0x2000, 0x7F);
    assert_eq!(cartridge.rom_bank(), 0x7F);
    assert_eq!(cartridge.load_rom_byte(0x4000), 0x7F);

    cartridge.store_rom_byte(0x2000, 0x00);
    assert_eq!(cartridge.rom_bank(), 1);

    cartridge.store_rom_byte(0x4000, 0x03);
    assert_eq!(cartridge.ram_bank(), 3);
}

#[test]
fn mbc5_nine_bit_bank_allows_bank_zero() {
    let mut cartridge = Cartridge::with_layout(MbcKind::Mbc5, numbered_rom(2), 1);

    // The ninth bit arrives through its own control window.
    cartridge.store_rom_byte(0x2000, 0x34);
    cartridge.store_rom_byte(0x3000, 0x01);
    assert_eq!(cartridge.rom_bank(), 0x134);

    cartridge.store_rom_byte(0x3000, 0x00);
    assert_eq!(cartridge.rom_bank(), 0x034);

    // Unlike the other controllers, bank 0 is selectable.
    cartridge.store_rom_byte(0x2000, 0x00);
    assert_eq!(cartridge.rom_bank(), 0);
    assert_eq!(cartridge.load_rom_byte(0x4000), 0);
}

#[test]
fn reads_past_the_image_return_open_bus() {
    let mut cartridge = Cartridge::with_layout(MbcKind::Mbc5, numbered_rom(2), 0);
    cartridge.store_rom_byte(0x2000, 0x10);
    assert_eq!(cartridge.load_rom_byte(0x4000), 0xFF);
}

#[test]
fn absent_ram_reads_zero_and_drops_writes() {
    let mut cartridge = Cartridge::with_layout(MbcKind::RomOnly, numbered_rom(2), 0);
    cartridge.store_ram_byte(0xA000, 0x55);
    assert_eq!(cartridge.load_ram_byte(0xA000), 0);
}

#[test]
fn word_ops_go_through_the_bank_mapping() {
    let mut cartridge = Cartridge::with_layout(MbcKind::Mbc3, numbered_rom(4), 1);
    cartridge.store_ram_byte(0xA000, 0x34);
    cartridge.store_ram_byte(0xA001, 0x12);
    assert_eq!(cartridge.load_ram_word(0xA000), 0x1234);

    cartridge.store_ram_word(0xA010, 0xBEEF);
    assert_eq!(cartridge.load_ram_byte(0xA010), 0xEF);
    assert_eq!(cartridge.load_ram_byte(0xA011), 0xBE);

    cartridge.store_rom_byte(0x2000, 0x02);
    assert_eq!(cartridge.load_rom_word(0x4000), 0x0002);
}
